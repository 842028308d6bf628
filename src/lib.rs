pub mod bus;
pub mod config;
pub mod context;
pub mod downlink_queue;
pub mod gateway;
pub mod logger;
pub mod semtech_udp;
pub mod supervisor;
pub mod translator;

pub mod constants {
    use std::time::Duration;

    /// Semtech packet forwarder protocol version (v1.6 of the forwarder).
    pub const PROTOCOL_VERSION: u8 = 2;

    pub const PKT_PUSH_DATA: u8 = 0x00;
    pub const PKT_PUSH_ACK: u8 = 0x01;
    pub const PKT_PULL_DATA: u8 = 0x02;
    pub const PKT_PULL_RESP: u8 = 0x03;
    pub const PKT_PULL_ACK: u8 = 0x04;
    pub const PKT_TX_ACK: u8 = 0x05;

    /// version + token + identifier
    pub const HEADER_LEN: usize = 4;
    /// header + gateway EUI, where the JSON body of PUSH_DATA / TX_ACK starts
    pub const DATA_OFFSET: usize = 12;
    pub const ACK_LEN: usize = 32;
    pub const UDP_BUFFER_SIZE: usize = 65_535;

    pub const ETH_NAME_DEFAULT: &str = "eth0";
    pub const BRIDGE_CONF_DEFAULT: &str = "/etc/lorabridge/lorabridge.toml";
    pub const BRIDGE_TOPIC_CONF_DEFAULT: &str = "/etc/lorabridge/lorabridge_topic.conf";
    pub const SYSFS_NET_ROOT: &str = "/sys/class/net";

    pub const MQTT_KEEPALIVE: Duration = Duration::from_secs(60);
    pub const MQTT_STREAM_BUFFER: usize = 1024;
    pub const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
    pub const RECONNECT_MAX_DEFAULT: Duration = Duration::from_secs(60);
    pub const RECONNECT_MAX_LIMIT: Duration = Duration::from_secs(24 * 3600);

    pub const DOWNLINK_QUEUE_SIZE_DEFAULT: usize = 32;
    pub const LOG_LEVEL_DEFAULT: u32 = 4;
}
