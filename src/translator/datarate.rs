//! `datr` handling.
//!
//! LoRa datarates arrive as a combined code (`SF7BW125`) and are matched by
//! independent substring search for the spreading-factor and bandwidth
//! tokens, so `BW125SF7` is accepted as well. A string carrying an
//! unexpected extra token such as `SF7BW125SF9` also matches; no regional
//! parameter table is consulted. FSK datarates are a plain bit rate.

use serde::Deserialize;

use super::TranslateError;

const SPREADING_FACTORS: [(&str, u8); 6] = [
    ("SF10", 10),
    ("SF11", 11),
    ("SF12", 12),
    ("SF7", 7),
    ("SF8", 8),
    ("SF9", 9),
];

const BANDWIDTHS: [(&str, u16); 3] = [("BW125", 125), ("BW250", 250), ("BW500", 500)];

/// Raw `datr` value as it appears in `rxpk` / `txpk`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Datr {
    Lora(String),
    Fsk(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Lora { spreading_factor: u8, bandwidth: u16 },
    Fsk { bitrate: u64 },
}

impl Datr {
    pub fn data_rate(&self) -> Result<DataRate, TranslateError> {
        match self {
            Datr::Lora(code) => parse_lora_datarate(code),
            Datr::Fsk(bitrate) => Ok(DataRate::Fsk { bitrate: *bitrate }),
        }
    }
}

pub fn parse_lora_datarate(code: &str) -> Result<DataRate, TranslateError> {
    let spreading_factor = SPREADING_FACTORS
        .iter()
        .find(|(token, _)| code.contains(token))
        .map(|(_, sf)| *sf);
    let bandwidth = BANDWIDTHS
        .iter()
        .find(|(token, _)| code.contains(token))
        .map(|(_, bw)| *bw);

    match (spreading_factor, bandwidth) {
        (Some(spreading_factor), Some(bandwidth)) => Ok(DataRate::Lora {
            spreading_factor,
            bandwidth,
        }),
        _ => Err(TranslateError::DataRate(code.to_string())),
    }
}
