/**
 * CALLBACK REGISTRY - Process-wide sink for asynchronous callback deliveries
 *
 * RÔLE :
 * Target functions that accept function-typed parameters don't return their
 * result; they deliver it later through a callback wrapper built from the
 * request's reply topic `s` and the callback id occupying that argument's
 * slot. The wrapper emits through this single, process-wide sink, installed
 * once at agent startup (see DESIGN NOTES "Global dispatch sink").
 *
 * Ordering: emissions for one callback id preserve invocation order because
 * the target calls them in order and each call publishes synchronously
 * before returning; emissions across distinct callback ids are independent.
 */
use std::sync::OnceLock;

use serde_json::Value;
use tracing::warn;

use crate::wire::CallbackEnvelope;

type Sink = dyn Fn(CallbackEnvelope) + Send + Sync;

static SINK: OnceLock<Box<Sink>> = OnceLock::new();

/// Installs the process-wide dispatch sink. Must be called exactly once,
/// before any callback-bearing request is dispatched. A second call is
/// ignored (logged) rather than panicking, so tests can install a mock sink
/// without racing a prior installation in the same process.
pub fn install<F>(sink: F)
where
    F: Fn(CallbackEnvelope) + Send + Sync + 'static,
{
    if SINK.set(Box::new(sink)).is_err() {
        warn!("callback sink already installed, ignoring re-install");
    }
}

/// Emits a callback envelope through the installed sink. A call before
/// `install` is a programming error upstream (the agent always installs
/// its sink before subscribing); it is logged and dropped rather than
/// panicking the event loop.
pub fn emit(envelope: CallbackEnvelope) {
    match SINK.get() {
        Some(sink) => sink(envelope),
        None => warn!(
            id = %envelope.id,
            "callback emitted before sink installed, dropping"
        ),
    }
}

/// A bound callback: the reply topic and opaque id lifted from one
/// function-typed request argument. Target closures construct one of these
/// for each callback-typed parameter they receive and call `emit` whenever
/// they want to deliver a result.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    reply_topic: String,
    callback_id: String,
}

impl CallbackHandle {
    pub fn new(reply_topic: impl Into<String>, callback_id: impl Into<String>) -> Self {
        Self {
            reply_topic: reply_topic.into(),
            callback_id: callback_id.into(),
        }
    }

    /// Packs `args` as positional `_1.._N` values and emits the envelope.
    pub fn emit(&self, args: Vec<Value>) {
        let mut data = serde_json::Map::new();
        for (i, arg) in args.into_iter().enumerate() {
            data.insert(format!("_{}", i + 1), arg);
        }
        emit(CallbackEnvelope {
            id: self.callback_id.clone(),
            data: Value::Object(data),
            s: self.reply_topic.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn handle_packs_positional_args() {
        let received: Arc<Mutex<Vec<CallbackEnvelope>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_store = received.clone();
        install(move |env| sink_store.lock().push(env));

        let handle = CallbackHandle::new("reply/2", "cb-7");
        handle.emit(vec![Value::from(100)]);

        let envelopes = received.lock();
        let env = envelopes.last().expect("one emission recorded");
        assert_eq!(env.id, "cb-7");
        assert_eq!(env.s, "reply/2");
        assert_eq!(env.data.get("_1").unwrap(), 100);
    }
}
