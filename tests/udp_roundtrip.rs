use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lora_gateway_bridge::bus::RecordingPublisher;
use lora_gateway_bridge::config::BridgeConfig;
use lora_gateway_bridge::context::BridgeContext;
use lora_gateway_bridge::downlink_queue::DownlinkQueue;
use lora_gateway_bridge::gateway::{identity::resolve_identity_in, resolve_topics, TopicSource, TopicStore};
use lora_gateway_bridge::semtech_udp::{ProtocolEngine, UdpServer};
use lora_gateway_bridge::translator::Translator;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::watch;

const CONFIG: &str = r#"
[backend]
type = "semtech_udp"

[backend.semtech_udp]
udp_bind = "127.0.0.1:0"
skip_crc_check = false
fake_rx_time = false
downlink_queue_size = 2

[integration.mqtt]
event_topic_template = "gateway/{{ .GatewayID }}/event/{{ .EventType }}"
command_topic_template = "gateway/{{ .GatewayID }}/command/{{ .CommandType }}"

[integration.mqtt.auth]
type = "generic"

[integration.mqtt.auth.generic]
server = "127.0.0.1:1883"
username = ""
password = ""
qos = 0
clean_session = true
client_id = ""
ca_cert = ""
tls_cert = ""
tls_key = ""
"#;

struct Harness {
    _dir: tempfile::TempDir,
    addr: SocketAddr,
    queue: Arc<DownlinkQueue>,
    publisher: Arc<RecordingPublisher>,
    ctx: Arc<BridgeContext>,
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

async fn start() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let iface = dir.path().join("net/eth0");
    fs::create_dir_all(&iface).expect("sysfs");
    fs::write(iface.join("address"), "b8:27:eb:aa:bb:cc\n").expect("mac");

    let config = BridgeConfig::from_toml_str(CONFIG).expect("config");
    let identity = resolve_identity_in(&dir.path().join("net"), "eth0").expect("identity");
    assert_eq!(identity.as_str(), "b827ebfffeaabbcc");

    let store = TopicStore::new(dir.path().join("lorabridge_topic.conf"));
    let (topics, source) = resolve_topics(&identity, &store).expect("topics");
    assert_eq!(source, TopicSource::Regenerated);

    let udp = &config.backend.semtech_udp;
    let queue = Arc::new(DownlinkQueue::with_capacity(udp.downlink_queue_size));
    let publisher = Arc::new(RecordingPublisher::new());
    let translator = Translator::new(config.integration.marshaler, &identity, udp, "eth0")
        .with_local_ip("192.0.2.1");
    let ctx = Arc::new(BridgeContext::new(
        identity,
        topics,
        Arc::clone(&queue),
        translator,
        publisher.clone(),
    ));

    let server = UdpServer::bind(udp.bind_addr().expect("bind addr"), ProtocolEngine::new(Arc::clone(&ctx)))
        .await
        .expect("bind");
    let addr = server.local_addr().expect("addr");
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(server.run(shutdown));

    Harness {
        _dir: dir,
        addr,
        queue,
        publisher,
        ctx,
        stop,
        task,
    }
}

async fn exchange(gateway: &UdpSocket, to: SocketAddr, datagram: &[u8]) -> Vec<u8> {
    gateway.send_to(datagram, to).await.expect("send");
    let mut buffer = vec![0u8; 2048];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), gateway.recv_from(&mut buffer))
        .await
        .expect("reply in time")
        .expect("recv");
    buffer.truncate(n);
    buffer
}

fn datagram(token: [u8; 2], kind: u8, body: &str) -> Vec<u8> {
    let mut out = vec![2, token[0], token[1], kind, 0xb8, 0x27, 0xeb, 0xff, 0xfe, 0xaa, 0xbb, 0xcc];
    out.extend_from_slice(body.as_bytes());
    out
}

#[tokio::test]
async fn test_gateway_session_over_loopback() {
    let harness = start().await;
    let gateway = UdpSocket::bind("127.0.0.1:0").await.expect("gateway socket");

    // uplink
    let push = datagram(
        [0x3c, 0x01],
        0x00,
        r#"{"rxpk":[{"freq":868.1,"datr":"SF7BW125","data":"QUJD","tmst":100,"rssi":-42,"rfch":0,"chan":1}]}"#,
    );
    let ack = exchange(&gateway, harness.addr, &push).await;
    assert_eq!(ack.len(), 32);
    assert_eq!(&ack[..4], &[2, 0x3c, 0x01, 0x01]);

    let uplinks = harness.publisher.on_topic(&harness.ctx.topics.uplink);
    assert_eq!(uplinks.len(), 1);
    let event: Value = serde_json::from_slice(&uplinks[0]).expect("uplink json");
    assert_eq!(event["txInfo"]["frequency"], 868_100_000u64);
    assert_eq!(event["phyPayload"], "QUJD");

    // nothing queued yet
    let reply = exchange(&gateway, harness.addr, &datagram([0, 1], 0x02, "")).await;
    assert_eq!(&reply[..4], &[2, 0, 1, 0x04]);

    // bounded queue drops the oldest of three downlinks
    for n in 1..=3 {
        harness.queue.push(format!(
            r#"{{"txpk":{{"imme":false,"tmst":{},"freq":869.525,"powe":14,"datr":"SF12BW125","data":"QUJD"}}}}"#,
            n
        ));
    }
    let first = exchange(&gateway, harness.addr, &datagram([0, 2], 0x02, "")).await;
    assert_eq!(first[3], 0x03);
    let body: Value = serde_json::from_slice(&first[4..]).expect("pull_resp json");
    assert_eq!(body["txpk"]["tmst"], 2);

    let second = exchange(&gateway, harness.addr, &datagram([0, 3], 0x02, "")).await;
    let body: Value = serde_json::from_slice(&second[4..]).expect("pull_resp json");
    assert_eq!(body["txpk"]["tmst"], 3);
    assert!(harness.queue.is_empty());
    assert_eq!(harness.publisher.on_topic(&harness.ctx.topics.downlink).len(), 2);

    // TX_ACK has no reply; follow it with a PULL_DATA so the ack is processed
    gateway
        .send_to(&datagram([0, 4], 0x05, r#"{"txpk_ack":{"error":"NONE"}}"#), harness.addr)
        .await
        .expect("send tx_ack");
    let reply = exchange(&gateway, harness.addr, &datagram([0, 5], 0x02, "")).await;
    assert_eq!(&reply[..4], &[2, 0, 5, 0x04]);
    assert_eq!(harness.publisher.on_topic(&harness.ctx.topics.downlink_ack).len(), 1);

    harness.stop.send(true).expect("stop");
    tokio::time::timeout(Duration::from_secs(2), harness.task)
        .await
        .expect("server stops")
        .expect("join");
}

#[tokio::test]
async fn test_stale_version_gets_no_reply() {
    let harness = start().await;
    let gateway = UdpSocket::bind("127.0.0.1:0").await.expect("gateway socket");

    let mut stale = datagram([7, 7], 0x00, r#"{"rxpk":[{"freq":868.1,"datr":"SF7BW125","data":"QUJD"}]}"#);
    stale[0] = 1;
    gateway.send_to(&stale, harness.addr).await.expect("send");

    // The next valid exchange is answered with its own token only.
    let reply = exchange(&gateway, harness.addr, &datagram([8, 8], 0x02, "")).await;
    assert_eq!(&reply[..4], &[2, 8, 8, 0x04]);
    assert!(harness.publisher.published().is_empty());

    harness.stop.send(true).expect("stop");
    let _ = harness.task.await;
}
