/**
 * AGENT RUNTIME - MQTT session, discovery/liveness publications, inbound pump
 *
 * RÔLE :
 * Owns the live MQTT session end to end: resolves the broker, sets the
 * last-will, announces itself, pumps inbound publishes through the
 * Request Dispatcher, applies the lifecycle side effects a create/delete
 * call implies (subscribe/unsubscribe, class-info republication, orphan
 * tracking), and reconnects forever until asked to shut down.
 *
 * FONCTIONNEMENT :
 * Network polling lives in its own spawned task and forwards decoded
 * events over an mpsc channel; `serve` drains that channel on the calling
 * task, which is the single place registry mutation and reply publication
 * happen — one cooperative event loop, no locking needed across requests.
 * The client handle itself is safe to use concurrently with the polling
 * task, so publishing a reply never blocks on that loop.
 */
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, LastWill, MqttOptions, QoS};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback;
use crate::config::ConnectOptions;
use crate::dispatch;
use crate::error::AgentError;
use crate::identity;
use crate::registry::Registry;
use crate::topic::{self, ParsedTopic, STATIC_INSTANCE_TOKEN};
use crate::wire::{AgentInfo, AgentStatus, CallbackEnvelope, ClassInfo, ClientInfo};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);
const INBOUND_CHANNEL_CAPACITY: usize = 256;

enum InboundEvent {
    Connected,
    Publish { topic: String, payload: Vec<u8> },
    Disconnected,
}

pub struct AgentRuntime {
    client: AsyncClient,
    registry: Arc<Registry>,
    domain: String,
    agent: String,
    version: Option<String>,
    network_task: JoinHandle<()>,
    inbound: mpsc::Receiver<InboundEvent>,
    /// Live instances (named or isolated) this runtime currently holds a
    /// member-topic subscription for, kept so a reconnect can re-subscribe
    /// everything before the first request is accepted (S6).
    active_instances: HashMap<String, String>,
    /// Sender topics (`s`) this runtime currently watches `__clientInfo__`
    /// for, because at least one isolated instance is owned by that
    /// sender.
    watched_clients: HashSet<String>,
}

impl AgentRuntime {
    pub fn new(options: &ConnectOptions, registry: Arc<Registry>) -> Result<Self, AgentError> {
        let broker = options.broker_address()?;
        let client_id = identity::generate_client_id(&options.domain, &options.agent);

        let mut mqtt_options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        if broker.is_tls() {
            warn!(host = %broker.host, "tls brokers (ssl/mqtts) are not yet wired up, connecting as plain tcp");
        }
        if let (Some(username), Some(password)) = (
            options.credentials.username.clone(),
            options.credentials.password.clone(),
        ) {
            mqtt_options.set_credentials(username, password);
        }

        let will_payload = serde_json::to_vec(&AgentInfo::offline(identity::hostname()))
            .map_err(|e| AgentError::Config(format!("failed to encode last will: {e}")))?;
        mqtt_options.set_last_will(LastWill::new(
            topic::agent_info_topic(&options.domain, &options.agent),
            will_payload,
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
        install_callback_sink(client.clone());
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let network_task = tokio::spawn(async move {
            loop {
                let outcome = eventloop.poll().await;
                let event = match outcome {
                    Ok(Event::Incoming(Incoming::ConnAck(ack)))
                        if ack.code == ConnectReturnCode::Success =>
                    {
                        Some(InboundEvent::Connected)
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => Some(InboundEvent::Publish {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "mqtt connection error, backing off");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                        Some(InboundEvent::Disconnected)
                    }
                };
                if let Some(event) = event {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(AgentRuntime {
            client,
            registry,
            domain: options.domain.clone(),
            agent: options.agent.clone(),
            version: options.version.clone(),
            network_task,
            inbound: rx,
            active_instances: HashMap::new(),
            watched_clients: HashSet::new(),
        })
    }

    /// Drives the agent until ctrl-c, then shuts down gracefully.
    pub async fn serve(mut self) -> Result<(), AgentError> {
        loop {
            tokio::select! {
                event = self.inbound.recv() => {
                    match event {
                        Some(InboundEvent::Connected) => self.on_connected().await?,
                        Some(InboundEvent::Publish { topic, payload }) => {
                            self.handle_publish(&topic, payload).await;
                        }
                        Some(InboundEvent::Disconnected) => {
                            debug!("mqtt session interrupted, awaiting reconnect");
                        }
                        None => {
                            warn!("network task ended, stopping agent");
                            return Ok(());
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    /// Startup sequence per connect/reconnect: announce online, subscribe
    /// the static topic set, publish class-info, and re-establish every
    /// subscription this runtime already held before the (re)connect.
    async fn on_connected(&mut self) -> Result<(), AgentError> {
        info!(domain = %self.domain, agent = %self.agent, "connected, announcing");

        let agent_info = AgentInfo::online(identity::hostname(), self.version.clone());
        self.publish_retained(&topic::agent_info_topic(&self.domain, &self.agent), &agent_info)
            .await?;

        for class_name in self.registry.get_classes() {
            for t in topic::static_subscription_set(&self.registry, &self.domain, &self.agent, &class_name) {
                self.subscribe(&t).await;
            }
            self.publish_class_info(&class_name).await?;
        }

        for (instance_id, class_name) in self.active_instances.clone() {
            for t in topic::member_subscription_set(
                &self.registry,
                &self.domain,
                &self.agent,
                &class_name,
                &instance_id,
            ) {
                self.subscribe(&t).await;
            }
        }
        for client_id in self.watched_clients.clone() {
            self.subscribe(&topic::client_info_topic(&client_id)).await;
        }

        Ok(())
    }

    async fn handle_publish(&mut self, topic_str: &str, payload: Vec<u8>) {
        match ParsedTopic::parse(topic_str) {
            Some(ParsedTopic::ClientInfo { client_id }) => {
                self.handle_client_info(&client_id, &payload).await;
            }
            Some(ParsedTopic::Invocation { class, instance, function, .. }) => {
                self.handle_invocation(class, instance, function, payload).await;
            }
            None => {
                warn!(topic = topic_str, "received message with invalid topic uri");
            }
        }
    }

    /// Reaps every isolated instance owned by `client_id` when that client
    /// reports itself offline (I6). `client_id` here is the sender topic
    /// (`s`) the owning create request carried, matching how ownership was
    /// recorded in `handle_invocation`.
    async fn handle_client_info(&mut self, client_id: &str, payload: &[u8]) {
        let info: ClientInfo = match serde_json::from_slice(payload) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, client = client_id, "malformed client-info payload, ignoring");
                return;
            }
        };
        if info.status != AgentStatus::Offline {
            return;
        }

        let reaped = self.registry.reap_client(client_id);
        for (instance_id, class_name) in &reaped {
            self.unsubscribe_member_topics(class_name, instance_id).await;
            self.active_instances.remove(instance_id);
            if let Err(e) = self.publish_class_info(class_name).await {
                warn!(error = %e, class = class_name, "failed to republish class-info after orphan reap");
            }
        }
        self.client
            .unsubscribe(topic::client_info_topic(client_id))
            .await
            .ok();
        self.watched_clients.remove(client_id);
    }

    async fn handle_invocation(&mut self, class: String, instance: String, function: String, payload: Vec<u8>) {
        let data_value: Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, class = %class, function = %function, "malformed request payload, dropping");
                return;
            }
        };

        let context = if instance == STATIC_INSTANCE_TOKEN { class.clone() } else { instance.clone() };
        let sender = data_value.get("s").and_then(Value::as_str).unwrap_or_default().to_string();
        let combined = serde_json::json!({
            "context": context,
            "method": function,
            "data": data_value.clone(),
            "s": sender,
        });

        let Some(encoded) = serde_json::to_vec(&combined).ok() else { return };
        let Some(dispatched) = dispatch::handle_request(&self.registry, &encoded) else { return };

        self.apply_lifecycle_side_effects(&class, &function, &data_value, &dispatched.payload, &sender)
            .await;

        if let Err(e) = self
            .client
            .publish(dispatched.reply_topic.as_str(), QoS::AtLeastOnce, false, dispatched.payload.clone())
            .await
        {
            warn!(error = %e, topic = %dispatched.reply_topic, "failed to publish reply");
        }
    }

    /// Mirrors §4.7's three lifecycle branches. `function` is the request's
    /// original (pre-signature) method name, which is how the runtime
    /// tells an anonymous create (`__create__`, an isolated instance) apart
    /// from a named one (`__createNamed__`, a shared instance).
    async fn apply_lifecycle_side_effects(
        &mut self,
        class: &str,
        function: &str,
        request_data: &Value,
        reply_payload: &[u8],
        sender: &str,
    ) {
        match function {
            "__create__" => {
                if let Some(instance_id) = reply_result_string(reply_payload) {
                    self.subscribe_member_topics(class, &instance_id).await;
                    self.active_instances.insert(instance_id.clone(), class.to_string());
                    self.registry.track_isolated(sender, &instance_id, class);
                    if self.watched_clients.insert(sender.to_string()) {
                        self.subscribe(&topic::client_info_topic(sender)).await;
                    }
                }
            }
            "__createNamed__" => {
                if let Some(instance_id) = reply_result_string(reply_payload) {
                    self.subscribe_member_topics(class, &instance_id).await;
                    self.active_instances.insert(instance_id, class.to_string());
                    if let Err(e) = self.publish_class_info(class).await {
                        warn!(error = %e, class, "failed to republish class-info after create");
                    }
                }
            }
            "__delete__" => {
                if let Some(instance_id) = request_data
                    .get("_1")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                {
                    self.unsubscribe_member_topics(class, &instance_id).await;
                    self.active_instances.remove(&instance_id);
                    self.registry.untrack_isolated(sender, &instance_id, class);
                    if let Err(e) = self.publish_class_info(class).await {
                        warn!(error = %e, class, "failed to republish class-info after delete");
                    }
                    if self.registry.client_has_no_isolated(sender) && self.watched_clients.remove(sender) {
                        self.client.unsubscribe(topic::client_info_topic(sender)).await.ok();
                    }
                }
            }
            _ => {}
        }
    }

    async fn subscribe_member_topics(&mut self, class: &str, instance: &str) {
        for t in topic::member_subscription_set(&self.registry, &self.domain, &self.agent, class, instance) {
            self.subscribe(&t).await;
        }
    }

    async fn unsubscribe_member_topics(&mut self, class: &str, instance: &str) {
        for t in topic::member_subscription_set(&self.registry, &self.domain, &self.agent, class, instance) {
            self.client.unsubscribe(t).await.ok();
        }
    }

    async fn subscribe(&self, t: &str) {
        if let Err(e) = self.client.subscribe(t, QoS::AtLeastOnce).await {
            warn!(error = %e, topic = t, "subscribe failed");
        }
    }

    async fn publish_class_info(&self, class_name: &str) -> Result<(), AgentError> {
        let info = ClassInfo {
            class_name: class_name.to_string(),
            instances: self.registry.get_instances(class_name),
            member_functions: self.registry.get_member_functions(class_name),
            static_functions: self.registry.get_static_functions(class_name),
            meta: self.registry.get_meta_data(class_name),
            v: crate::wire::PROTOCOL_VERSION,
        };
        self.publish_retained(&topic::class_info_topic(&self.domain, &self.agent, class_name), &info)
            .await
    }

    async fn publish_retained<T: serde::Serialize>(&self, t: &str, value: &T) -> Result<(), AgentError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| AgentError::Config(format!("failed to encode {t}: {e}")))?;
        self.client
            .publish(t, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))
    }

    async fn shutdown(&mut self) {
        info!("shutting down");
        let offline = AgentInfo::offline(identity::hostname());
        let _ = self
            .publish_retained(&topic::agent_info_topic(&self.domain, &self.agent), &offline)
            .await;
        let _ = self.client.disconnect().await;
        self.network_task.abort();
    }
}

/// Installs the process-wide callback sink once, before any subscription
/// is made. Delivers each envelope to its own `s` at QoS1, using
/// `try_publish` since targets emit callbacks from plain synchronous
/// closures with no async context to `.await` a publish from.
fn install_callback_sink(client: AsyncClient) {
    callback::install(move |envelope: CallbackEnvelope| {
        let reply_topic = envelope.s.clone();
        match serde_json::to_vec(&envelope) {
            Ok(payload) => {
                if let Err(e) = client.try_publish(reply_topic.as_str(), QoS::AtLeastOnce, false, payload) {
                    warn!(error = %e, topic = %reply_topic, "failed to publish callback envelope");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode callback envelope"),
        }
    });
}

/// Pulls `data.r` out of an already-encoded reply payload as a string,
/// used to recover the instance id a successful create returned.
fn reply_result_string(reply_payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(reply_payload).ok()?;
    value.get("data")?.get("r")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_result_string_extracts_successful_create_id() {
        let payload = serde_json::to_vec(&serde_json::json!({
            "context": "Foo",
            "method": "__create__",
            "data": { "r": "iso-9" },
            "s": "reply/1",
        }))
        .unwrap();
        assert_eq!(reply_result_string(&payload).as_deref(), Some("iso-9"));
    }

    #[test]
    fn reply_result_string_is_none_on_error_reply() {
        let payload = serde_json::to_vec(&serde_json::json!({
            "context": "Foo",
            "method": "__create__",
            "data": { "e": "boom" },
            "s": "reply/1",
        }))
        .unwrap();
        assert_eq!(reply_result_string(&payload), None);
    }
}
