/**
 * IDENTITY HELPERS - Best-effort hostname/user/platform discovery
 *
 * RÔLE :
 * Derives a default agent name and MQTT client id when the operator
 * doesn't supply one. Every lookup degrades to the literal `"unknown"`
 * rather than failing the process — identity is advisory, not load
 * bearing.
 */
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const UNKNOWN: &str = "unknown";

pub fn hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// A short id derived from the current executable's path, standing in for
/// the original's hash-of-current-working-directory trick: distinguishes
/// two agents run from different install locations on the same host.
pub fn path_id() -> String {
    let path = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| UNKNOWN.to_string());
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:x}", hasher.finish())[..4].to_string()
}

pub fn platform() -> &'static str {
    std::env::consts::OS
}

/// `<user>-<path-id>@<hostname>-<platform>-rust`, the default `agent`
/// identity when the operator passes none.
pub fn generate_agent_name() -> String {
    format!(
        "{}-{}@{}-{}-rust",
        username(),
        path_id(),
        hostname(),
        platform()
    )
}

/// A short, stable MQTT client id derived from `domain` + `agent`, mirroring
/// the original's "hash the pair, keep a few hex digits" approach. Not
/// required to be globally unique, only unlikely enough to collide.
pub fn generate_client_id(domain: &str, agent: &str) -> String {
    let mut hasher = DefaultHasher::new();
    domain.hash(&mut hasher);
    agent.hash(&mut hasher);
    format!("vrpca{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_has_expected_shape() {
        let name = generate_agent_name();
        assert!(name.contains('@'));
        assert!(name.ends_with("-rust"));
    }

    #[test]
    fn client_id_is_deterministic_for_same_inputs() {
        let a = generate_client_id("public.vrpc", "agent1");
        let b = generate_client_id("public.vrpc", "agent1");
        assert_eq!(a, b);
        assert!(a.starts_with("vrpca"));
    }

    #[test]
    fn client_id_differs_across_agents() {
        let a = generate_client_id("public.vrpc", "agent1");
        let b = generate_client_id("public.vrpc", "agent2");
        assert_ne!(a, b);
    }
}
