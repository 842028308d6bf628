//! MQTT client adapter.
//!
//! Connects to the broker, subscribes to the gateway's downlink topic and
//! feeds every inbound message into the downlink queue from a dedicated
//! worker thread. Publishing is fire-and-forget from any thread.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use paho_mqtt::{AsyncClient, ConnectOptions, ConnectOptionsBuilder, CreateOptionsBuilder, SslOptionsBuilder};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{EventPublisher, ReconnectBackoff};
use crate::config::{ConfigError, GenericAuthConfig, MqttConfig};
use crate::constants::{MQTT_KEEPALIVE, MQTT_STREAM_BUFFER};
use crate::downlink_queue::DownlinkQueue;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] paho_mqtt::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("broker rejected subscription to {topic} (code 0x{code:02x})")]
    SubscribeRejected { topic: String, code: i32 },

    #[error("cannot start bus worker: {0}")]
    Worker(#[source] std::io::Error),
}

pub struct MqttBridge {
    client: AsyncClient,
    qos: i32,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBridge {
    /// Connect, subscribe to `downlink_topic` and start the inbound worker.
    /// Stops on its own once `shutdown` flips to `true`.
    pub async fn connect(
        config: &MqttConfig,
        downlink_topic: &str,
        queue: Arc<DownlinkQueue>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, BusError> {
        let generic = &config.auth.generic;
        let uri = generic.broker()?.uri(generic.tls().is_some());
        let qos = i32::from(generic.qos);
        let backoff = ReconnectBackoff::new(config.max_reconnect_interval()?);

        let create_opts = CreateOptionsBuilder::new()
            .server_uri(&uri)
            .client_id(&generic.client_id)
            .finalize();
        let mut client = AsyncClient::new(create_opts)?;
        let receiver = client.get_stream(MQTT_STREAM_BUFFER);

        info!(
            "Connecting to {} (qos {}, keepalive {}s, tls {})",
            uri,
            qos,
            MQTT_KEEPALIVE.as_secs(),
            generic.tls().is_some()
        );
        client.connect(connect_options(generic)?).await?;

        if let Err(e) = subscribe(&client, downlink_topic, qos).await {
            let _ = client.disconnect(None).await;
            return Err(e);
        }

        let worker = {
            let client = client.clone();
            let topic = downlink_topic.to_string();
            std::thread::Builder::new()
                .name("mqtt-bus".into())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            error!("Cannot start bus runtime: {}", e);
                            return;
                        }
                    };
                    runtime.block_on(async move {
                        let mut shutdown = shutdown;
                        let mut backoff = backoff;
                        loop {
                            match receiver.recv().await {
                                Ok(Some(msg)) => {
                                    enqueue_downlink(&queue, msg.topic(), msg.payload());
                                }
                                Ok(None) => {
                                    if *shutdown.borrow() {
                                        break;
                                    }
                                    warn!("Connection to broker lost");
                                    if !reconnect(&client, &topic, qos, &mut backoff, &mut shutdown).await {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        debug!("Bus worker finished");
                    });
                })
                .map_err(BusError::Worker)?
        };

        Ok(Self {
            client,
            qos,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Disconnect from the broker and wait for the worker to finish.
    pub async fn stop(&self) {
        if let Err(e) = self.client.disconnect(None).await {
            debug!("Disconnect: {}", e);
        }
        self.client.stop_stream();

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Bus worker panicked");
            }
        }
        info!("Disconnected from broker");
    }
}

impl EventPublisher for MqttBridge {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        // The delivery token is not awaited.
        let _ = self.client.publish(paho_mqtt::Message::new(topic, payload, self.qos));
    }
}

fn connect_options(generic: &GenericAuthConfig) -> Result<ConnectOptions, BusError> {
    let mut builder = ConnectOptionsBuilder::new();
    builder
        .keep_alive_interval(MQTT_KEEPALIVE)
        .clean_session(generic.clean_session);

    if let Some((username, password)) = generic.credentials() {
        builder.user_name(username).password(password);
    }

    if let Some(tls) = generic.tls() {
        let mut ssl = SslOptionsBuilder::new();
        ssl.trust_store(tls.ca_cert)?
            .key_store(tls.tls_cert)?
            .private_key(tls.tls_key)?
            .verify(false);
        if let Some(pass_phrase) = tls.pass_phrase {
            ssl.private_key_password(pass_phrase);
        }
        builder.ssl_options(ssl.finalize());
    }

    Ok(builder.finalize())
}

async fn subscribe(client: &AsyncClient, topic: &str, qos: i32) -> Result<(), BusError> {
    let rsp = client.subscribe(topic, qos).await?;
    match rsp.subscribe_response() {
        Some(code) if code >= 0x80 => Err(BusError::SubscribeRejected {
            topic: topic.to_string(),
            code,
        }),
        granted => {
            info!("Subscribed to {} (granted qos {:?})", topic, granted);
            Ok(())
        }
    }
}

/// Queue one inbound downlink. Payloads that are not UTF-8 are dropped.
/// Returns whether the payload was queued.
pub(crate) fn enqueue_downlink(queue: &DownlinkQueue, topic: &str, payload: &[u8]) -> bool {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping non UTF-8 downlink on {}: {}", topic, e);
            return false;
        }
    };
    debug!("Downlink of {} bytes on {}", text.len(), topic);
    if let Some(evicted) = queue.push(text.to_string()) {
        warn!(
            "Downlink queue full ({}), dropped oldest entry of {} bytes",
            queue.capacity(),
            evicted.len()
        );
    }
    true
}

/// The broker operations the reconnect loop needs.
#[async_trait(?Send)]
pub(crate) trait BrokerSession {
    async fn reconnect(&self) -> Result<(), BusError>;
    async fn subscribe(&self, topic: &str, qos: i32) -> Result<(), BusError>;
}

#[async_trait(?Send)]
impl BrokerSession for AsyncClient {
    async fn reconnect(&self) -> Result<(), BusError> {
        AsyncClient::reconnect(self).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: i32) -> Result<(), BusError> {
        subscribe(self, topic, qos).await
    }
}

/// Reconnect with backoff until it works. Returns `false` if shutdown was
/// requested first.
pub(crate) async fn reconnect<S: BrokerSession + ?Sized>(
    session: &S,
    topic: &str,
    qos: i32,
    backoff: &mut ReconnectBackoff,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *shutdown.borrow() {
            return false;
        }
        let delay = backoff.next_delay();
        info!("Reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), backoff.attempts());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return false,
        }

        let attempt = tokio::select! {
            result = session.reconnect() => result,
            _ = shutdown.changed() => return false,
        };
        match attempt {
            Ok(()) => match session.subscribe(topic, qos).await {
                Ok(()) => {
                    info!("Reconnected to broker after {} attempt(s)", backoff.attempts());
                    backoff.reset();
                    return true;
                }
                Err(e) => warn!("Resubscribe failed: {}", e),
            },
            Err(e) => warn!("Reconnect failed: {}", e),
        }
    }
}
