use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vrpc_agent::agent::AgentRuntime;
use vrpc_agent::config::{self, CliOutcome};
use vrpc_agent::registry::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vrpc_agent=info".to_string()),
        )
        .init();

    let outcome = config::parse_args(std::env::args().skip(1)).context("invalid arguments")?;
    let options = match outcome {
        CliOutcome::PrintAndExit(text) => {
            println!("{text}");
            return Ok(());
        }
        CliOutcome::Run(options) => options,
    };

    let registry = Arc::new(Registry::new());
    register_demo_classes(&registry);

    info!(domain = %options.domain, agent = %options.agent, broker = %options.broker, "starting agent");
    let runtime = AgentRuntime::new(&options, registry).context("failed to start agent runtime")?;
    runtime.serve().await.context("agent runtime failed")?;

    Ok(())
}

/// A small built-in class so a fresh checkout has something invocable out
/// of the box. Real deployments register their own classes the same way
/// before constructing the `AgentRuntime`.
fn register_demo_classes(registry: &Registry) {
    use serde_json::Value;

    #[derive(Default)]
    struct Counter {
        value: i64,
    }

    registry.register_constructor(
        "Counter",
        "",
        Arc::new(|_data| Ok(Box::new(Counter::default()))),
    );
    registry.register_member_function(
        "Counter",
        "increment-number",
        Arc::new(|handle, data| {
            let step = data.get("_1").and_then(Value::as_i64).unwrap_or(1);
            let mut guard = handle.lock();
            let counter = guard.downcast_mut::<Counter>().expect("Counter instance");
            counter.value += step;
            Ok(Value::from(counter.value))
        }),
    );
    registry.register_member_function(
        "Counter",
        "getValue",
        Arc::new(|handle, _data| {
            let guard = handle.lock();
            Ok(Value::from(guard.downcast_ref::<Counter>().expect("Counter instance").value))
        }),
    );
}
