/**
 * TOPIC MAPPER - MQTT topic tokens <-> (class, instance, function) triples
 *
 * RÔLE :
 * Canonical grammar: `<domain>/<agent>/<class>/<instance>/<function>`,
 * five tokens, where `<instance>` is the literal `__static__` for
 * constructors/static calls or an instance id for member calls. A second,
 * unrelated four-token grammar carries client liveness, ending in the
 * literal `__clientInfo__`; its first three tokens are the client id.
 *
 * Anything that doesn't tokenize into one of those two exact shapes is
 * rejected outright; the adapter never guesses.
 */
use crate::registry::Registry;

pub const STATIC_INSTANCE_TOKEN: &str = "__static__";
const CLIENT_INFO_SUFFIX: &str = "__clientInfo__";

/// A parsed inbound publish topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic {
    /// Five tokens: `<domain>/<agent>/<class>/<instance>/<function>`.
    Invocation {
        domain: String,
        agent: String,
        class: String,
        instance: String,
        function: String,
    },
    /// Four tokens ending in `__clientInfo__`: `<a>/<b>/<c>/__clientInfo__`.
    /// The prefix (first three tokens joined by `/`) is the client id used
    /// to key the isolated-instance ownership index.
    ClientInfo { client_id: String },
}

impl ParsedTopic {
    /// Splits on `/` and classifies. Rejects anything that is not exactly
    /// five tokens, or exactly four tokens ending in `__clientInfo__`.
    pub fn parse(topic: &str) -> Option<ParsedTopic> {
        let tokens: Vec<&str> = topic.split('/').collect();
        match tokens.as_slice() {
            [domain, agent, class, instance, function] => Some(ParsedTopic::Invocation {
                domain: domain.to_string(),
                agent: agent.to_string(),
                class: class.to_string(),
                instance: instance.to_string(),
                function: function.to_string(),
            }),
            [a, b, c, last] if *last == CLIENT_INFO_SUFFIX => Some(ParsedTopic::ClientInfo {
                client_id: format!("{a}/{b}/{c}"),
            }),
            _ => None,
        }
    }

    /// The request `context` this topic implies: the class name for
    /// `__static__` calls, the literal instance id otherwise. `None` for
    /// client-info topics, which never carry a request.
    pub fn context(&self) -> Option<&str> {
        match self {
            ParsedTopic::Invocation { class, instance, .. } => {
                if instance == STATIC_INSTANCE_TOKEN {
                    Some(class.as_str())
                } else {
                    Some(instance.as_str())
                }
            }
            ParsedTopic::ClientInfo { .. } => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            ParsedTopic::Invocation { function, .. } => Some(function.as_str()),
            ParsedTopic::ClientInfo { .. } => None,
        }
    }
}

/// Builds `<domain>/<agent>/<class>/__static__/<base_name>`.
pub fn static_topic(domain: &str, agent: &str, class: &str, base_name: &str) -> String {
    format!("{domain}/{agent}/{class}/{STATIC_INSTANCE_TOKEN}/{base_name}")
}

/// Builds `<domain>/<agent>/<class>/<instance>/<base_name>`.
pub fn member_topic(domain: &str, agent: &str, class: &str, instance: &str, base_name: &str) -> String {
    format!("{domain}/{agent}/{class}/{instance}/{base_name}")
}

pub fn agent_info_topic(domain: &str, agent: &str) -> String {
    format!("{domain}/{agent}/__agentInfo__")
}

pub fn class_info_topic(domain: &str, agent: &str, class: &str) -> String {
    format!("{domain}/{agent}/{class}/__classInfo__")
}

/// `<client_id>/__clientInfo__`, the counterpart topic this agent
/// subscribes to once a client owns at least one isolated instance.
pub fn client_info_topic(client_id: &str) -> String {
    format!("{client_id}/{CLIENT_INFO_SUFFIX}")
}

/// Every static topic this agent must subscribe to for one class: one
/// topic per distinct base name across its static functions and the
/// synthesized lifecycle operations.
pub fn static_subscription_set(registry: &Registry, domain: &str, agent: &str, class: &str) -> Vec<String> {
    registry
        .static_base_names(class)
        .into_iter()
        .map(|base| static_topic(domain, agent, class, &base))
        .collect()
}

/// Every member topic this agent must subscribe to once `instance` exists:
/// one topic per distinct member-function base name on `class`.
pub fn member_subscription_set(
    registry: &Registry,
    domain: &str,
    agent: &str,
    class: &str,
    instance: &str,
) -> Vec<String> {
    registry
        .member_base_names(class)
        .into_iter()
        .map(|base| member_topic(domain, agent, class, instance, &base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_five_token_invocation() {
        let parsed = ParsedTopic::parse("public.vrpc/agent1/Calc/__static__/add").unwrap();
        assert_eq!(
            parsed,
            ParsedTopic::Invocation {
                domain: "public.vrpc".into(),
                agent: "agent1".into(),
                class: "Calc".into(),
                instance: "__static__".into(),
                function: "add".into(),
            }
        );
        assert_eq!(parsed.context(), Some("Calc"));
        assert_eq!(parsed.method(), Some("add"));
    }

    #[test]
    fn resolves_instance_context_for_non_static_token() {
        let parsed = ParsedTopic::parse("public.vrpc/agent1/Foo/foo-1/setValue").unwrap();
        assert_eq!(parsed.context(), Some("foo-1"));
    }

    #[test]
    fn parses_four_token_client_info() {
        let parsed = ParsedTopic::parse("public.vrpc/cli-A/session-1/__clientInfo__").unwrap();
        assert_eq!(
            parsed,
            ParsedTopic::ClientInfo {
                client_id: "public.vrpc/cli-A/session-1".into(),
            }
        );
    }

    #[test]
    fn rejects_wrong_token_counts() {
        assert!(ParsedTopic::parse("a/b/c").is_none());
        assert!(ParsedTopic::parse("a/b/c/d/e/f").is_none());
        assert!(ParsedTopic::parse("a/b/c/notClientInfo").is_none());
    }

    #[test]
    fn static_subscription_set_is_deduplicated_by_base_name() {
        let registry = Registry::new();
        registry.register_static_function(
            "Calc",
            "add-numbernumber",
            std::sync::Arc::new(|_data| Ok(serde_json::Value::Null)),
        );
        registry.register_static_function(
            "Calc",
            "add-stringstring",
            std::sync::Arc::new(|_data| Ok(serde_json::Value::Null)),
        );
        let topics = static_subscription_set(&registry, "public.vrpc", "agent1", "Calc");
        assert_eq!(topics, vec!["public.vrpc/agent1/Calc/__static__/add".to_string()]);
    }

    #[test]
    fn topic_builders_round_trip_through_parser() {
        let topic = member_topic("d", "a", "Foo", "foo-1", "setValue");
        let parsed = ParsedTopic::parse(&topic).unwrap();
        assert_eq!(parsed.context(), Some("foo-1"));
        assert_eq!(parsed.method(), Some("setValue"));
    }
}
