#![forbid(unsafe_code)]

//! Log events emitted over a selector's lifecycle.

use std::sync::{Arc, Mutex};

use memostore::{SelectorOptions, Store, StoreConfig, untracked};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Default)]
struct Captured {
    messages: Vec<(tracing::Level, String)>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state
                .lock()
                .expect("capture lock")
                .messages
                .push((*event.metadata().level(), message));
        }
    }
}

fn capture() -> (Arc<Mutex<Captured>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    (state, tracing::subscriber::set_default(subscriber))
}

fn saw(state: &Arc<Mutex<Captured>>, level: tracing::Level, message: &str) -> bool {
    state
        .lock()
        .expect("capture lock")
        .messages
        .iter()
        .any(|(l, m)| *l == level && m == message)
}

#[test]
fn attach_and_detach_are_logged() {
    let (state, _guard) = capture();
    let store = Store::with_config(0, StoreConfig::default().with_name("counter"));
    let selector = store.selector(|n: &i32| n * 2, SelectorOptions::default());

    let handle = selector.attach().unwrap();
    store.set(1).unwrap();
    drop(handle);

    assert!(saw(&state, tracing::Level::DEBUG, "selector attached"));
    assert!(saw(&state, tracing::Level::TRACE, "selector recomputed"));
    assert!(saw(&state, tracing::Level::DEBUG, "selector detached"));
}

#[test]
fn misuse_is_logged_as_warning() {
    let (state, _guard) = capture();
    let store = Store::with_config(0, StoreConfig::default());
    let inner = store.selector(|n: &i32| n + 1, SelectorOptions::default());
    let outer = store.selector(
        move |_: &i32| {
            let misuse = inner.peek().is_err();
            let allowed = untracked(|| inner.peek()).is_ok();
            (misuse, allowed)
        },
        SelectorOptions::default(),
    );

    assert_eq!(outer.peek(), Ok((true, true)));
    assert!(saw(&state, tracing::Level::WARN, "peek inside derivation"));
}
