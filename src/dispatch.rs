/**
 * REQUEST DISPATCHER - Wire-level request handling around the registry
 *
 * RÔLE :
 * Sits between the MQTT inbound-publish handler and the Invocation
 * Registry. Turns a raw payload into a `RequestDoc`, hands it to
 * `Registry::call` for resolution, and serializes the reply back to bytes.
 * A malformed payload never reaches the registry at all: it is answered
 * with a decode-failure reply addressed back to whatever reply topic could
 * be salvaged from the raw JSON, or dropped if even that can't be read.
 */
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::registry::Registry;
use crate::wire::RequestDoc;

/// Outcome of dispatching one inbound publish: the reply topic to publish
/// on and the encoded reply payload.
pub struct Dispatched {
    pub reply_topic: String,
    pub payload: Vec<u8>,
}

/// Parses `payload`, invokes `registry`, and encodes the reply. Returns
/// `None` only when the payload is so malformed that no reply topic can be
/// recovered at all (the request is silently dropped, matching "never
/// publish to an unknown topic").
pub fn handle_request(registry: &Registry, payload: &[u8]) -> Option<Dispatched> {
    let mut req = match RequestDoc::from_slice(payload) {
        Ok(req) => req,
        Err(e) => return reply_to_malformed(payload, e),
    };

    debug!(context = %req.context, method = %req.method, "dispatching request");
    registry.call(&mut req);
    encode_reply(&req)
}

fn encode_reply(req: &RequestDoc) -> Option<Dispatched> {
    match serde_json::to_vec(&req.to_payload()) {
        Ok(payload) => Some(Dispatched {
            reply_topic: req.s.clone(),
            payload,
        }),
        Err(e) => {
            warn!(error = %e, "failed to encode reply, dropping");
            None
        }
    }
}

/// Best-effort salvage of a reply topic from a payload that failed to
/// parse into a `RequestDoc` (e.g. `data` was missing or not an object).
/// If the top-level `s` or `context`/`method` fields are themselves
/// readable, answers with a `DecodeFailure`; otherwise the request is
/// unanswerable and is dropped.
fn reply_to_malformed(payload: &[u8], cause: AgentError) -> Option<Dispatched> {
    let raw: Value = serde_json::from_slice(payload).ok()?;
    let reply_topic = raw.get("s").and_then(Value::as_str)?.to_string();
    let context = raw
        .get("context")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let method = raw
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    warn!(error = %cause, "malformed request, replying with decode failure");
    let reply = serde_json::json!({
        "context": context,
        "method": method,
        "data": { "e": cause.wire_message() },
        "s": reply_topic,
    });
    serde_json::to_vec(&reply)
        .ok()
        .map(|payload| Dispatched { reply_topic, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with_echo() -> Registry {
        let registry = Registry::new();
        registry.register_static_function(
            "Echo",
            "say-string",
            Arc::new(|data| {
                let args_obj = data.as_object().unwrap();
                Ok(args_obj.get("_1").cloned().unwrap_or(Value::Null))
            }),
        );
        registry
    }

    #[test]
    fn well_formed_request_round_trips_through_registry() {
        let registry = registry_with_echo();
        let payload =
            br#"{"context":"Echo","method":"say","data":{"_1":"hi"},"s":"reply/echo"}"#;
        let dispatched = handle_request(&registry, payload).unwrap();
        assert_eq!(dispatched.reply_topic, "reply/echo");
        let decoded: Value = serde_json::from_slice(&dispatched.payload).unwrap();
        assert_eq!(decoded["data"]["r"], "hi");
    }

    #[test]
    fn unknown_context_becomes_error_reply_not_a_drop() {
        let registry = Registry::new();
        let payload = br#"{"context":"Nope","method":"go","data":{},"s":"reply/x"}"#;
        let dispatched = handle_request(&registry, payload).unwrap();
        let decoded: Value = serde_json::from_slice(&dispatched.payload).unwrap();
        assert_eq!(decoded["data"]["e"], "Could not find context: Nope");
    }

    #[test]
    fn malformed_data_field_salvages_reply_topic() {
        let registry = Registry::new();
        let payload = br#"{"context":"Echo","method":"say","data":"not-an-object","s":"reply/bad"}"#;
        let dispatched = handle_request(&registry, payload).unwrap();
        assert_eq!(dispatched.reply_topic, "reply/bad");
        let decoded: Value = serde_json::from_slice(&dispatched.payload).unwrap();
        assert!(decoded["data"]["e"].as_str().unwrap().contains("data must be an object"));
    }

    #[test]
    fn unparseable_json_with_no_salvageable_topic_is_dropped() {
        let registry = Registry::new();
        let dispatched = handle_request(&registry, b"not json at all");
        assert!(dispatched.is_none());
    }
}
