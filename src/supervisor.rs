//! Process lifecycle: start everything in order, serve until a termination
//! signal, then take it down in reverse.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::MqttBridge;
use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::downlink_queue::DownlinkQueue;
use crate::gateway::{resolve_identity, resolve_topics, TopicSource, TopicStore};
use crate::logger;
use crate::semtech_udp::{ProtocolEngine, UdpServer};
use crate::translator::Translator;

/// Command-line inputs of a bridge run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub topic_file: PathBuf,
    pub log_filter: Option<String>,
}

/// Cloneable trigger for a graceful stop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Install the SIGINT / SIGTERM handler.
    pub fn install_signal_handler(&self) -> Result<()> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            info!("Termination signal received, shutting down");
            shutdown.trigger();
        })
        .context("installing signal handler")
    }
}

pub async fn run(options: RunOptions) -> Result<()> {
    let config = BridgeConfig::from_file(&options.config_path)
        .with_context(|| format!("loading configuration {}", options.config_path.display()))?;

    logger::init(
        config.general.log_level,
        options.log_filter.as_deref(),
        config.general.log_file.as_deref(),
    )
    .context("initializing logger")?;
    info!("lora-gateway-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    let identity = resolve_identity(&config.general.interface)
        .context("resolving gateway identity")?;
    let store = TopicStore::new(&options.topic_file);
    let (topics, source) = resolve_topics(&identity, &store).context("resolving topics")?;
    match source {
        TopicSource::Persisted => info!("Using topics from {}", store.path().display()),
        TopicSource::Regenerated => info!("Wrote new topics to {}", store.path().display()),
    }
    info!("Uplink topic:        {}", topics.uplink);
    info!("Downlink topic:      {}", topics.downlink);
    info!("Downlink ack topic:  {}", topics.downlink_ack);
    info!("Gateway stat topic:  {}", topics.gateway_stat);
    info!("Downlink sub topic:  {}", topics.downlink_tx);

    let udp = &config.backend.semtech_udp;
    let queue = Arc::new(DownlinkQueue::with_capacity(udp.downlink_queue_size));
    let translator = Translator::new(config.integration.marshaler, &identity, udp, &config.general.interface);
    info!("Output format: {:?}", translator.format());

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler()?;

    let bind_addr = udp.bind_addr()?;
    let bridge = Arc::new(
        MqttBridge::connect(
            &config.integration.mqtt,
            &topics.downlink_tx,
            Arc::clone(&queue),
            shutdown.subscribe(),
        )
        .await
        .context("connecting to MQTT broker")?,
    );

    let ctx = Arc::new(BridgeContext::new(identity, topics, queue, translator, bridge.clone()));
    let server = match UdpServer::bind(bind_addr, ProtocolEngine::new(ctx)).await {
        Ok(server) => server,
        Err(e) => {
            bridge.stop().await;
            return Err(e).with_context(|| format!("binding UDP socket {}", bind_addr));
        }
    };

    server.run(shutdown.subscribe()).await;

    if !shutdown.is_triggered() {
        warn!("UDP server stopped without a shutdown request");
        shutdown.trigger();
    }
    bridge.stop().await;
    info!("Bridge stopped");
    Ok(())
}
