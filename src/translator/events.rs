#![allow(non_snake_case)]
//! Enriched event schema published for network servers.

use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LoRaModulationInfo {
    pub bandwidth: u16,
    pub spreadingFactor: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codeRate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polarizationInversion: Option<bool>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FSKModulationInfo {
    pub FSKDataRate: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub FSKFreqDev: Option<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UplinkTxInfo {
    pub frequency: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modulation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub LoRaModulationInfo: Option<LoRaModulationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub FSKModulationInfo: Option<FSKModulationInfo>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UplinkRxInfo {
    pub gatewayID: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fineTimestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssis: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub LoRaSNR: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfChain: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub LoRaFreqOffset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antenna: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub CRCStatus: Option<i32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UplinkEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phyPayloadSize: Option<u32>,
    pub phyPayload: String,
    pub txInfo: UplinkTxInfo,
    pub rxInfo: UplinkRxInfo,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Timing {
    Immediately,
    Delay,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownlinkTxInfo {
    pub frequency: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modulation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfChain: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub LoRaModulationInfo: Option<LoRaModulationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub FSKModulationInfo: Option<FSKModulationInfo>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownlinkEvent {
    pub gatewayID: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phyPayloadSize: Option<u32>,
    pub phyPayload: String,
    pub txInfo: DownlinkTxInfo,
    pub timing: Timing,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<i32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GatewayStatsEvent {
    pub gatewayID: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub rxPacketsReceived: u32,
    pub rxPacketsReceivedOK: u32,
    pub txPacketsReceived: u32,
    pub txPacketsEmitted: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownlinkAckEvent {
    pub gatewayID: String,
    /// Unix seconds at the bridge when the ack was relayed
    pub gatewayTimeStamp: i64,
    pub downlinkAck: serde_json::Value,
}
