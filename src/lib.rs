//! MQTT remote-procedure-call agent runtime: an in-process invocation
//! registry exposed over MQTT through a fixed topic grammar, with
//! lifecycle-managed instances and asynchronous callback delivery.

pub mod agent;
pub mod callback;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod registry;
pub mod signature;
pub mod topic;
pub mod wire;
