//! Bus topics for one gateway and the record that pins them on disk.
//!
//! The record file is shared with the topic-management tool, so a record
//! whose `gateway_eui` still matches is reused verbatim even if the topic
//! derivation below changes.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::identity::GatewayIdentity;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("cannot write topic record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize topic record: {0}")]
    Serialize(#[from] serde_json::Error),
}

const SUFFIX_UP: &str = "up";
const SUFFIX_DOWN: &str = "down";
const SUFFIX_ACK: &str = "ack";
const SUFFIX_STAT: &str = "stat";
const SUFFIX_TX: &str = "tx";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub uplink: String,
    pub downlink: String,
    pub downlink_ack: String,
    pub gateway_stat: String,
    /// The only subscribed topic; carries downlinks from the network server.
    pub downlink_tx: String,
}

impl TopicSet {
    pub fn for_identity(identity: &GatewayIdentity) -> Self {
        let topic = |suffix: &str| format!("gateway/{}/event/{}", identity, suffix);
        Self {
            uplink: topic(SUFFIX_UP),
            downlink: topic(SUFFIX_DOWN),
            downlink_ack: topic(SUFFIX_ACK),
            gateway_stat: topic(SUFFIX_STAT),
            downlink_tx: topic(SUFFIX_TX),
        }
    }

    fn publish_topics(&self) -> [&str; 4] {
        [&self.uplink, &self.downlink, &self.downlink_ack, &self.gateway_stat]
    }

    /// Every topic is scoped to `<eui>/event` and the subscribe topic never
    /// collides with a publish topic.
    pub fn is_valid_for(&self, identity: &GatewayIdentity) -> bool {
        let scope = format!("{}/event", identity);
        let scoped = self
            .publish_topics()
            .iter()
            .chain(std::iter::once(&self.downlink_tx.as_str()))
            .all(|t| t.contains(&scope));
        scoped && !self.publish_topics().contains(&self.downlink_tx.as_str())
    }
}

/// On-disk JSON record, field names fixed by the topic-management tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub gateway_eui: String,
    pub topic_pub_rxpk: String,
    pub topic_pub_downlink: String,
    pub topic_pub_downlink_ack: String,
    pub topic_pub_gateway_stat: String,
    pub topic_sub_txpk: String,
}

impl TopicRecord {
    pub fn new(identity: &GatewayIdentity, topics: &TopicSet) -> Self {
        Self {
            gateway_eui: identity.to_string(),
            topic_pub_rxpk: topics.uplink.clone(),
            topic_pub_downlink: topics.downlink.clone(),
            topic_pub_downlink_ack: topics.downlink_ack.clone(),
            topic_pub_gateway_stat: topics.gateway_stat.clone(),
            topic_sub_txpk: topics.downlink_tx.clone(),
        }
    }

    pub fn topics(&self) -> TopicSet {
        TopicSet {
            uplink: self.topic_pub_rxpk.clone(),
            downlink: self.topic_pub_downlink.clone(),
            downlink_ack: self.topic_pub_downlink_ack.clone(),
            gateway_stat: self.topic_pub_gateway_stat.clone(),
            downlink_tx: self.topic_sub_txpk.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicStore {
    path: PathBuf,
}

impl TopicStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable record is the same as no record.
    pub fn load(&self) -> Option<TopicRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("No topic record at {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring unparseable topic record {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Overwrite the record, pretty-printed with four-space indentation.
    pub fn save(&self, record: &TopicRecord) -> Result<(), TopicError> {
        let write_err = |source| TopicError::Write {
            path: self.path.clone(),
            source,
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        record.serialize(&mut ser)?;
        buf.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = std::fs::File::create(&self.path).map_err(write_err)?;
        file.write_all(&buf).map_err(write_err)?;
        Ok(())
    }
}

/// Where the resolved topics came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSource {
    Persisted,
    Regenerated,
}

/// Reuse the persisted topics when the record belongs to `identity`,
/// otherwise derive fresh ones and overwrite the record.
pub fn resolve_topics(
    identity: &GatewayIdentity,
    store: &TopicStore,
) -> Result<(TopicSet, TopicSource), TopicError> {
    if let Some(record) = store.load() {
        if record.gateway_eui == identity.as_str() {
            let topics = record.topics();
            if topics.is_valid_for(identity) {
                info!("Topics for {} loaded from {}", identity, store.path().display());
                return Ok((topics, TopicSource::Persisted));
            }
            warn!("Persisted topics for {} are inconsistent, regenerating", identity);
        } else {
            info!(
                "Gateway EUI changed from `{}` to {}, regenerating topics",
                record.gateway_eui, identity
            );
        }
    }

    let topics = TopicSet::for_identity(identity);
    store.save(&TopicRecord::new(identity, &topics))?;
    info!("Topics for {} written to {}", identity, store.path().display());
    Ok((topics, TopicSource::Regenerated))
}
