/**
 * WIRE SCHEMA - Canonical JSON shapes exchanged over MQTT
 *
 * RÔLE :
 * Defines the request/reply envelope and the three discovery/liveness
 * documents (class-info, agent-info, client-info). Everything here is a
 * plain serde_json::Value payload under `data`; arguments are packed
 * positionally as `_1`, `_2`, ... in the order the caller supplied them.
 */
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL_VERSION: u32 = 3;

/// A request or reply document. `data` carries positional args (`_1`..`_N`)
/// on the way in and `r`/`e` on the way out; `r` and `e` must never both be
/// present. `s` is duplicated at top level and inside `data` — see
/// DESIGN.md for which location is canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDoc {
    pub context: String,
    pub method: String,
    pub data: Value,
    pub s: String,
}

impl RequestDoc {
    /// Parse a raw MQTT payload into a request, normalizing `data` so that
    /// it always exists and always carries `s`, even if the sender only
    /// put `s` at the top level.
    pub fn from_slice(payload: &[u8]) -> Result<Self, crate::error::AgentError> {
        let mut value: Value = serde_json::from_slice(payload)
            .map_err(|e| crate::error::AgentError::DecodeFailure(e.to_string()))?;

        let context = value
            .get("context")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                crate::error::AgentError::DecodeFailure("missing field: context".into())
            })?
            .to_string();
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::error::AgentError::DecodeFailure("missing field: method".into()))?
            .to_string();
        let s = value
            .get("s")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::error::AgentError::DecodeFailure("missing field: s".into()))?
            .to_string();

        let mut data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Map::new()));
        if !data.is_object() {
            return Err(crate::error::AgentError::DecodeFailure(
                "field data must be an object".into(),
            ));
        }
        data.as_object_mut()
            .unwrap()
            .entry("s")
            .or_insert_with(|| Value::String(s.clone()));

        Ok(RequestDoc {
            context,
            method,
            data,
            s,
        })
    }

    /// Ordered positional argument values `_1..._N`, stopping at the first
    /// missing key. Used both for signature derivation and for dispatch.
    pub fn positional_args(&self) -> Vec<Value> {
        let mut out = Vec::new();
        let Some(obj) = self.data.as_object() else {
            return out;
        };
        let mut i = 1usize;
        loop {
            let key = format!("_{i}");
            match obj.get(&key) {
                Some(v) => {
                    out.push(v.clone());
                    i += 1;
                }
                None => break,
            }
        }
        out
    }

    pub fn set_result(&mut self, result: Value) {
        let obj = self.data.as_object_mut().expect("data is always an object");
        obj.remove("e");
        obj.insert("r".to_string(), result);
    }

    pub fn set_error(&mut self, message: String) {
        let obj = self.data.as_object_mut().expect("data is always an object");
        obj.remove("r");
        obj.insert("e".to_string(), Value::String(message));
    }

    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "context": self.context,
            "method": self.method,
            "data": self.data,
            "s": self.s,
        })
    }
}

/// `{ status: "online" | "offline", ... }` published retained on
/// `<domain>/<agent>/__agentInfo__` and the last-will payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub status: AgentStatus,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub v: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentInfo {
    pub fn online(hostname: String, version: Option<String>) -> Self {
        Self {
            status: AgentStatus::Online,
            hostname,
            version,
            v: PROTOCOL_VERSION,
        }
    }

    pub fn offline(hostname: String) -> Self {
        Self {
            status: AgentStatus::Offline,
            hostname,
            version: None,
            v: PROTOCOL_VERSION,
        }
    }
}

/// `{ className, instances, memberFunctions, staticFunctions, meta, v }`
/// published retained per class on `<domain>/<agent>/<class>/__classInfo__`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    #[serde(rename = "className")]
    pub class_name: String,
    pub instances: Vec<String>,
    #[serde(rename = "memberFunctions")]
    pub member_functions: Vec<String>,
    #[serde(rename = "staticFunctions")]
    pub static_functions: Vec<String>,
    pub meta: Value,
    pub v: u32,
}

/// `{ status: "online" | "offline" }` — produced by remote clients,
/// consumed here to trigger orphan reaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub status: AgentStatus,
}

/// Envelope published for an asynchronous callback delivery:
/// `{ id, data: {_1, ...}, s }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    pub id: String,
    pub data: Value,
    pub s: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_missing_data() {
        let payload = br#"{"context":"Calc","method":"add","data":{"_1":2,"_2":3},"s":"reply/1"}"#;
        let req = RequestDoc::from_slice(payload).unwrap();
        assert_eq!(req.context, "Calc");
        assert_eq!(req.method, "add");
        assert_eq!(req.positional_args(), vec![Value::from(2), Value::from(3)]);
        assert_eq!(req.data.get("s").unwrap(), "reply/1");
    }

    #[test]
    fn rejects_missing_required_fields() {
        let payload = br#"{"method":"add","data":{},"s":"r"}"#;
        assert!(RequestDoc::from_slice(payload).is_err());
    }

    #[test]
    fn set_result_and_error_are_mutually_exclusive() {
        let payload = br#"{"context":"C","method":"m","data":{},"s":"r"}"#;
        let mut req = RequestDoc::from_slice(payload).unwrap();
        req.set_result(Value::from(5));
        assert_eq!(req.data.get("r").unwrap(), 5);
        assert!(req.data.get("e").is_none());
        req.set_error("boom".into());
        assert!(req.data.get("r").is_none());
        assert_eq!(req.data.get("e").unwrap(), "boom");
    }

    #[test]
    fn positional_args_stop_at_first_gap() {
        let payload = br#"{"context":"C","method":"m","data":{"_1":1,"_3":3},"s":"r"}"#;
        let req = RequestDoc::from_slice(payload).unwrap();
        assert_eq!(req.positional_args(), vec![Value::from(1)]);
    }
}
