//! The packet forwarder's JSON objects, as far as the bridge reads them.
//!
//! Reference: PROTOCOL.TXT of the Semtech packet forwarder, sections 4 and 6.

use serde::Deserialize;

use super::datarate::Datr;

/// One received radio packet (`rxpk` array element).
#[derive(Debug, Clone, Deserialize)]
pub struct Rxpk {
    /// UTC time of reception, ISO 8601
    pub time: Option<String>,
    /// Concentrator internal counter, microseconds
    pub tmst: Option<u64>,
    /// Fine timestamp, nanoseconds since last PPS
    pub ftime: Option<u64>,
    /// Centre frequency, MHz
    pub freq: f64,
    pub chan: Option<u32>,
    pub rfch: Option<u32>,
    /// Concentrator modem the packet was received on
    pub mid: Option<u32>,
    pub ant: Option<u32>,
    /// CRC status: 1 OK, -1 fail, 0 no CRC
    pub stat: Option<i32>,
    pub modu: Option<String>,
    pub datr: Datr,
    pub codr: Option<String>,
    pub rssi: Option<i32>,
    pub rssis: Option<i32>,
    pub lsnr: Option<f64>,
    pub foff: Option<i32>,
    pub size: Option<u32>,
    /// Base64 PHY payload
    pub data: String,
}

/// One packet to transmit (`txpk` object of a PULL_RESP).
#[derive(Debug, Clone, Deserialize)]
pub struct Txpk {
    #[serde(default)]
    pub imme: bool,
    pub tmst: Option<u64>,
    pub freq: f64,
    pub rfch: Option<u32>,
    pub powe: Option<i32>,
    pub modu: Option<String>,
    pub datr: Datr,
    pub codr: Option<String>,
    /// FSK frequency deviation, Hz
    pub fdev: Option<u32>,
    pub ipol: Option<bool>,
    pub size: Option<u32>,
    pub data: String,
}

/// Gateway status report (`stat` object of a PUSH_DATA).
#[derive(Debug, Clone, Deserialize)]
pub struct Stat {
    pub time: Option<String>,
    pub lati: Option<f64>,
    pub long: Option<f64>,
    pub alti: Option<i32>,
    #[serde(default)]
    pub rxnb: u32,
    #[serde(default)]
    pub rxok: u32,
    #[serde(default)]
    pub dwnb: u32,
    #[serde(default)]
    pub txnb: u32,
}
