/**
 * ERROR TAXONOMY - Failure modes for the invocation engine and agent runtime
 *
 * Wire replies never carry a structured error: `data.e` is always a plain
 * string (see wire::Reply). `AgentError::to_string()` is that string.
 * Transport/config variants exist for the runtime boundary only and are
 * never placed on the wire.
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Could not find context: {0}")]
    ContextNotFound(String),

    #[error("Could not find function: {0}")]
    FunctionNotFound(String),

    #[error("{0}")]
    TargetFailure(String),

    #[error("{0}")]
    DecodeFailure(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AgentError {
    /// The string that belongs in `data.e` on the wire.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}
