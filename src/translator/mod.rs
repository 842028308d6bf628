//! Conversion of the forwarder's JSON into bus events.
//!
//! In passthrough mode each subtree is re-serialized under its wire key.
//! In enriched mode records are renamed, units converted (MHz to Hz) and
//! modulation parameters split out; a record that cannot be converted is
//! dropped on its own without affecting its siblings.

pub mod datarate;
pub mod events;
pub mod semtech;

use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{OutputFormat, SemtechUdpConfig};
use crate::gateway::GatewayIdentity;

use datarate::DataRate;
use events::{
    DownlinkAckEvent, DownlinkEvent, DownlinkTxInfo, FSKModulationInfo, GatewayStatsEvent,
    LoRaModulationInfo, Location, Timing, UplinkEvent, UplinkRxInfo, UplinkTxInfo,
};
use semtech::{Rxpk, Stat, Txpk};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("malformed {kind}: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognized datarate `{0}`")]
    DataRate(String),

    #[error("CRC status {0} rejected")]
    CrcRejected(i32),

    #[error("cannot serialize event: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub struct Translator {
    format: OutputFormat,
    gateway_id: String,
    skip_crc_check: bool,
    fake_rx_time: bool,
    interface: String,
    local_ip: OnceLock<String>,
}

impl Translator {
    pub fn new(
        format: OutputFormat,
        identity: &GatewayIdentity,
        udp: &SemtechUdpConfig,
        interface: &str,
    ) -> Self {
        Self {
            format,
            gateway_id: identity.to_base64(),
            skip_crc_check: udp.skip_crc_check,
            fake_rx_time: udp.fake_rx_time,
            interface: interface.to_string(),
            local_ip: OnceLock::new(),
        }
    }

    /// Pin the address reported in stats instead of looking it up.
    pub fn with_local_ip(self, ip: impl Into<String>) -> Self {
        let _ = self.local_ip.set(ip.into());
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// One payload per publishable `rxpk` element. In passthrough mode the
    /// whole array is a single payload.
    pub fn uplinks(&self, rxpk: &Value) -> Vec<Vec<u8>> {
        if self.format == OutputFormat::Passthrough {
            return serialize(&json!({ "rxpk": rxpk }))
                .map(|payload| vec![payload])
                .unwrap_or_default();
        }

        let Some(records) = rxpk.as_array() else {
            warn!("rxpk is not an array, nothing to publish");
            return Vec::new();
        };
        records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                match parse::<Rxpk>("rxpk", record).and_then(|r| self.uplink_event(&r)) {
                    Ok(event) => serialize(&event).ok(),
                    Err(e) => {
                        warn!("Skipping rxpk[{}]: {}", i, e);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn gateway_stats(&self, stat: &Value) -> Result<Vec<u8>, TranslateError> {
        match self.format {
            OutputFormat::Passthrough => serialize(&json!({ "stat": stat })),
            OutputFormat::Enriched => serialize(&self.stats_event(&parse::<Stat>("stat", stat)?)),
        }
    }

    pub fn downlink(&self, txpk: &Value) -> Result<Vec<u8>, TranslateError> {
        match self.format {
            OutputFormat::Passthrough => serialize(&json!({ "txpk": txpk })),
            OutputFormat::Enriched => serialize(&self.downlink_event(&parse::<Txpk>("txpk", txpk)?)?),
        }
    }

    pub fn downlink_ack(&self, txpk_ack: &Value) -> Result<Vec<u8>, TranslateError> {
        match self.format {
            OutputFormat::Passthrough => serialize(&json!({ "txpk_ack": txpk_ack })),
            OutputFormat::Enriched => serialize(&DownlinkAckEvent {
                gatewayID: self.gateway_id.clone(),
                gatewayTimeStamp: chrono::Utc::now().timestamp(),
                downlinkAck: txpk_ack.clone(),
            }),
        }
    }

    pub fn uplink_event(&self, rxpk: &Rxpk) -> Result<UplinkEvent, TranslateError> {
        if let Some(stat) = rxpk.stat.filter(|s| *s != 1) {
            if !self.skip_crc_check {
                return Err(TranslateError::CrcRejected(stat));
            }
        }

        let (lora, fsk) = modulation_info(rxpk.datr.data_rate()?, rxpk.codr.clone(), None, None);
        let time = match (&rxpk.time, self.fake_rx_time) {
            (Some(time), _) => Some(time.clone()),
            (None, true) => Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
            (None, false) => None,
        };

        Ok(UplinkEvent {
            phyPayloadSize: rxpk.size,
            phyPayload: rxpk.data.clone(),
            txInfo: UplinkTxInfo {
                frequency: mhz_to_hz(rxpk.freq),
                modulation: rxpk.modu.clone(),
                LoRaModulationInfo: lora,
                FSKModulationInfo: fsk,
            },
            rxInfo: UplinkRxInfo {
                gatewayID: self.gateway_id.clone(),
                time,
                timestamp: rxpk.tmst,
                fineTimestamp: rxpk.ftime,
                rssi: rxpk.rssi,
                rssis: rxpk.rssis,
                LoRaSNR: rxpk.lsnr,
                channel: rxpk.chan,
                rfChain: rxpk.rfch,
                LoRaFreqOffset: rxpk.foff,
                board: rxpk.mid,
                antenna: rxpk.ant,
                CRCStatus: rxpk.stat,
            },
        })
    }

    pub fn downlink_event(&self, txpk: &Txpk) -> Result<DownlinkEvent, TranslateError> {
        let (lora, fsk) =
            modulation_info(txpk.datr.data_rate()?, txpk.codr.clone(), txpk.ipol, txpk.fdev);

        Ok(DownlinkEvent {
            gatewayID: self.gateway_id.clone(),
            phyPayloadSize: txpk.size,
            phyPayload: txpk.data.clone(),
            txInfo: DownlinkTxInfo {
                frequency: mhz_to_hz(txpk.freq),
                power: txpk.powe,
                modulation: txpk.modu.clone(),
                rfChain: txpk.rfch,
                LoRaModulationInfo: lora,
                FSKModulationInfo: fsk,
            },
            timing: if txpk.imme {
                Timing::Immediately
            } else {
                Timing::Delay
            },
        })
    }

    pub fn stats_event(&self, stat: &Stat) -> GatewayStatsEvent {
        let location = if stat.lati.is_some() || stat.long.is_some() || stat.alti.is_some() {
            Some(Location {
                latitude: stat.lati,
                longitude: stat.long,
                altitude: stat.alti,
            })
        } else {
            None
        };

        GatewayStatsEvent {
            gatewayID: self.gateway_id.clone(),
            ip: self.local_ip(),
            time: stat.time.clone(),
            location,
            rxPacketsReceived: stat.rxnb,
            rxPacketsReceivedOK: stat.rxok,
            txPacketsReceived: stat.dwnb,
            txPacketsEmitted: stat.txnb,
        }
    }

    /// IPv4 address of the gateway's uplink interface. Cached after the first
    /// successful lookup; an empty string until one succeeds.
    pub fn local_ip(&self) -> String {
        if let Some(ip) = self.local_ip.get() {
            return ip.clone();
        }
        match interface_ip(&self.interface) {
            Some(ip) => {
                debug!("Local address {} resolved for {}", ip, self.interface);
                self.local_ip.get_or_init(|| ip).clone()
            }
            None => {
                warn!("No IPv4 address found for interface family of {}", self.interface);
                String::new()
            }
        }
    }
}

fn modulation_info(
    rate: DataRate,
    code_rate: Option<String>,
    polarization_inversion: Option<bool>,
    freq_dev: Option<u32>,
) -> (Option<LoRaModulationInfo>, Option<FSKModulationInfo>) {
    match rate {
        DataRate::Lora {
            spreading_factor,
            bandwidth,
        } => (
            Some(LoRaModulationInfo {
                bandwidth,
                spreadingFactor: spreading_factor,
                codeRate: code_rate,
                polarizationInversion: polarization_inversion,
            }),
            None,
        ),
        DataRate::Fsk { bitrate } => (
            None,
            Some(FSKModulationInfo {
                FSKDataRate: bitrate,
                FSKFreqDev: freq_dev,
            }),
        ),
    }
}

fn mhz_to_hz(freq: f64) -> u64 {
    (freq * 1_000_000.0).round() as u64
}

fn parse<T: DeserializeOwned>(kind: &'static str, value: &Value) -> Result<T, TranslateError> {
    T::deserialize(value).map_err(|source| TranslateError::Malformed { kind, source })
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, TranslateError> {
    serde_json::to_vec(value).map_err(TranslateError::Serialize)
}

/// First IPv4 address on an interface of the same family (`eth0` -> `eth*`).
fn interface_ip(interface: &str) -> Option<String> {
    let family = interface.trim_end_matches(|c: char| c.is_ascii_digit());
    local_ip_address::list_afinet_netifas()
        .ok()?
        .into_iter()
        .find(|(name, ip)| ip.is_ipv4() && name.contains(family))
        .map(|(_, ip)| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_config(skip_crc_check: bool, fake_rx_time: bool) -> SemtechUdpConfig {
        SemtechUdpConfig {
            udp_bind: "0.0.0.0:1700".into(),
            skip_crc_check,
            fake_rx_time,
            downlink_queue_size: 8,
        }
    }

    fn translator(format: OutputFormat) -> Translator {
        let identity = GatewayIdentity::from_mac([0, 0, 0, 0, 0, 1]);
        Translator::new(format, &identity, &udp_config(false, false), "eth0")
            .with_local_ip("192.168.1.20")
    }

    fn decode(payload: &[u8]) -> Value {
        serde_json::from_slice(payload).expect("json")
    }

    #[test]
    fn test_uplink_enriched() {
        let rxpk = json!([{
            "freq": 868.1, "datr": "SF7BW125", "data": "QUJD", "tmst": 100,
            "rssi": -42, "rfch": 0, "chan": 1
        }]);
        let out = translator(OutputFormat::Enriched).uplinks(&rxpk);
        assert_eq!(out.len(), 1);

        let event = decode(&out[0]);
        assert_eq!(event["txInfo"]["frequency"], 868_100_000u64);
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["spreadingFactor"], 7);
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["bandwidth"], 125);
        assert_eq!(event["phyPayload"], "QUJD");
        assert_eq!(event["rxInfo"]["gatewayID"], "MDAwMDAwZmZmZTAwMDAwMQ==");
        assert_eq!(event["rxInfo"]["timestamp"], 100);
        assert_eq!(event["rxInfo"]["rssi"], -42);
        assert_eq!(event["rxInfo"]["channel"], 1);
        assert_eq!(event["rxInfo"]["rfChain"], 0);
        // absent optional fields are not invented
        assert!(event["rxInfo"].get("LoRaSNR").is_none());
        assert!(event["rxInfo"].get("fineTimestamp").is_none());
        assert!(event["rxInfo"].get("time").is_none());
    }

    #[test]
    fn test_uplink_optional_fields_carried() {
        let rxpk = json!([{
            "freq": 867.5, "datr": "SF9BW125", "codr": "4/5", "data": "AA==", "size": 1,
            "lsnr": 7.5, "foff": -120, "ftime": 123456, "mid": 8, "stat": 1,
            "time": "2024-01-01T00:00:00Z", "modu": "LORA"
        }]);
        let out = translator(OutputFormat::Enriched).uplinks(&rxpk);
        let event = decode(&out[0]);
        assert_eq!(event["phyPayloadSize"], 1);
        assert_eq!(event["txInfo"]["modulation"], "LORA");
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["codeRate"], "4/5");
        assert_eq!(event["rxInfo"]["LoRaSNR"], 7.5);
        assert_eq!(event["rxInfo"]["LoRaFreqOffset"], -120);
        assert_eq!(event["rxInfo"]["fineTimestamp"], 123456);
        assert_eq!(event["rxInfo"]["board"], 8);
        assert_eq!(event["rxInfo"]["CRCStatus"], 1);
        assert_eq!(event["rxInfo"]["time"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_bad_datarate_skips_only_that_record() {
        let rxpk = json!([
            {"freq": 868.1, "datr": "XX99", "data": "QUJD"},
            {"freq": 868.3, "datr": "SF12BW500", "data": "REVG"}
        ]);
        let out = translator(OutputFormat::Enriched).uplinks(&rxpk);
        assert_eq!(out.len(), 1);
        let event = decode(&out[0]);
        assert_eq!(event["phyPayload"], "REVG");
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["spreadingFactor"], 12);
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["bandwidth"], 500);
    }

    #[test]
    fn test_malformed_record_skipped() {
        let rxpk = json!([{"datr": "SF7BW125", "data": "QUJD"}]);
        assert!(translator(OutputFormat::Enriched).uplinks(&rxpk).is_empty());
        assert!(translator(OutputFormat::Enriched).uplinks(&json!({"freq": 1})).is_empty());
    }

    #[test]
    fn test_fsk_uplink_has_no_bandwidth() {
        let rxpk = json!([{"freq": 868.8, "modu": "FSK", "datr": 50000, "data": "QUJD"}]);
        let out = translator(OutputFormat::Enriched).uplinks(&rxpk);
        let event = decode(&out[0]);
        assert_eq!(event["txInfo"]["FSKModulationInfo"]["FSKDataRate"], 50000);
        assert!(event["txInfo"].get("LoRaModulationInfo").is_none());
    }

    #[test]
    fn test_crc_check() {
        let rxpk = json!([{"freq": 868.1, "datr": "SF7BW125", "data": "QUJD", "stat": -1}]);
        assert!(translator(OutputFormat::Enriched).uplinks(&rxpk).is_empty());

        let identity = GatewayIdentity::from_mac([0, 0, 0, 0, 0, 1]);
        let lenient = Translator::new(OutputFormat::Enriched, &identity, &udp_config(true, false), "eth0");
        assert_eq!(lenient.uplinks(&rxpk).len(), 1);
    }

    #[test]
    fn test_fake_rx_time() {
        let identity = GatewayIdentity::from_mac([0, 0, 0, 0, 0, 1]);
        let faking = Translator::new(OutputFormat::Enriched, &identity, &udp_config(false, true), "eth0");
        let rxpk = json!([{"freq": 868.1, "datr": "SF7BW125", "data": "QUJD"}]);
        let event = decode(&faking.uplinks(&rxpk)[0]);
        assert!(event["rxInfo"]["time"].as_str().expect("time").ends_with('Z'));
    }

    #[test]
    fn test_uplink_passthrough() {
        let rxpk = json!([{"freq": 868.1, "datr": "XX99", "data": "QUJD"}]);
        let out = translator(OutputFormat::Passthrough).uplinks(&rxpk);
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]), json!({ "rxpk": rxpk }));
    }

    #[test]
    fn test_downlink_enriched() {
        let txpk = json!({
            "imme": true, "freq": 869.525, "rfch": 0, "powe": 14, "modu": "LORA",
            "datr": "SF9BW125", "codr": "4/5", "ipol": true, "size": 3, "data": "QUJD"
        });
        let event = decode(&translator(OutputFormat::Enriched).downlink(&txpk).expect("downlink"));
        assert_eq!(event["timing"], "IMMEDIATELY");
        assert_eq!(event["txInfo"]["frequency"], 869_525_000u64);
        assert_eq!(event["txInfo"]["power"], 14);
        assert_eq!(event["txInfo"]["LoRaModulationInfo"]["polarizationInversion"], true);
        assert_eq!(event["phyPayload"], "QUJD");

        let delayed = json!({"freq": 869.525, "datr": "SF9BW125", "data": "QUJD", "tmst": 5});
        let event = decode(&translator(OutputFormat::Enriched).downlink(&delayed).expect("downlink"));
        assert_eq!(event["timing"], "DELAY");
    }

    #[test]
    fn test_downlink_fsk_deviation() {
        let txpk = json!({"freq": 861.3, "modu": "FSK", "datr": 50000, "fdev": 3000, "data": "QUJD"});
        let event = decode(&translator(OutputFormat::Enriched).downlink(&txpk).expect("downlink"));
        assert_eq!(event["txInfo"]["FSKModulationInfo"]["FSKFreqDev"], 3000);
    }

    #[test]
    fn test_downlink_bad_datarate() {
        let txpk = json!({"freq": 869.525, "datr": "SF99", "data": "QUJD"});
        assert!(matches!(
            translator(OutputFormat::Enriched).downlink(&txpk),
            Err(TranslateError::DataRate(_))
        ));
    }

    #[test]
    fn test_gateway_stats() {
        let stat = json!({
            "time": "2024-01-01 00:00:00 GMT", "lati": 46.24, "long": 3.25, "alti": 145,
            "rxnb": 2, "rxok": 2, "rxfw": 2, "ackr": 100.0, "dwnb": 1, "txnb": 1
        });
        let event = decode(&translator(OutputFormat::Enriched).gateway_stats(&stat).expect("stat"));
        assert_eq!(event["ip"], "192.168.1.20");
        assert_eq!(event["location"]["latitude"], 46.24);
        assert_eq!(event["location"]["altitude"], 145);
        assert_eq!(event["rxPacketsReceived"], 2);
        assert_eq!(event["rxPacketsReceivedOK"], 2);
        assert_eq!(event["txPacketsReceived"], 1);
        assert_eq!(event["txPacketsEmitted"], 1);

        let no_gps = decode(&translator(OutputFormat::Enriched).gateway_stats(&json!({"rxnb": 0})).expect("stat"));
        assert!(no_gps.get("location").is_none());
    }

    #[test]
    fn test_downlink_ack() {
        let ack = json!({"error": "NONE"});
        let event = decode(&translator(OutputFormat::Enriched).downlink_ack(&ack).expect("ack"));
        assert_eq!(event["downlinkAck"], ack);
        assert!(event["gatewayTimeStamp"].as_i64().expect("ts") > 0);

        let raw = decode(&translator(OutputFormat::Passthrough).downlink_ack(&ack).expect("ack"));
        assert_eq!(raw, json!({ "txpk_ack": ack }));
    }

    #[test]
    fn test_frequency_rounding() {
        assert_eq!(mhz_to_hz(868.1), 868_100_000);
        assert_eq!(mhz_to_hz(867.3), 867_300_000);
        assert_eq!(mhz_to_hz(923.3), 923_300_000);
        assert_eq!(mhz_to_hz(869.525), 869_525_000);
    }
}
