/**
 * SIGNATURE ENCODER - Deterministic overload disambiguation
 *
 * For an ordered argument list, concatenate the domain-level type tag of
 * each value. Function-typed arguments travel on the wire as callback-id
 * strings, so they tag as `string` like any other string — the registry
 * never distinguishes them at the signature level, only at invocation time.
 */
use serde_json::Value;

/// One of the six JSON-derived wire type tags. `binary` is a seventh tag
/// reserved for a byte-string wire representation this JSON-only
/// transport never actually produces, kept for parity with the closed
/// tag set the protocol defines.
fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `""` for zero arguments, else `"-" + tag1 + tag2 + ...`.
pub fn signature_of(args: &[Value]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut sig = String::with_capacity(1 + args.len() * 6);
    sig.push('-');
    for arg in args {
        sig.push_str(type_tag(arg));
    }
    sig
}

/// Strips the `-tag1tag2...` suffix a full `name-sig` key carries, leaving
/// the bare function name used as the MQTT topic's last token.
pub fn base_name(full_name: &str) -> &str {
    match full_name.find('-') {
        Some(pos) => &full_name[..pos],
        None => full_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_signature_for_no_args() {
        assert_eq!(signature_of(&[]), "");
    }

    #[test]
    fn tags_in_order() {
        let args = vec![json!(2), json!(3)];
        assert_eq!(signature_of(&args), "-numbernumber");
    }

    #[test]
    fn covers_every_tag() {
        let args = vec![
            json!(null),
            json!(true),
            json!(1),
            json!("x"),
            json!([1, 2]),
            json!({"a": 1}),
        ];
        assert_eq!(
            signature_of(&args),
            "-nullbooleannumberstringarrayobject"
        );
    }

    #[test]
    fn callback_ids_tag_as_string() {
        // a callback-id occupies a function-typed slot but travels as a
        // plain JSON string, so it tags like one.
        let args = vec![json!("cb-7"), json!(100)];
        assert_eq!(signature_of(&args), "-stringnumber");
    }

    #[test]
    fn base_name_strips_signature() {
        assert_eq!(base_name("setValue-number"), "setValue");
        assert_eq!(base_name("getValue"), "getValue");
        assert_eq!(base_name("__delete__-string"), "__delete__");
    }
}
