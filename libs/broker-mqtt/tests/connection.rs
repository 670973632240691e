use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use broker_mqtt::MqttBroker;
use parrot_api::{Broker, ConnectOptions, ErrorKind, QoS};
use pipeline::{PipelineError, Relay, RelayConfig, TracingObserver};

const WAIT: Duration = Duration::from_secs(5);

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;

// ═══════════════════════════════════════════════════════════════
//  Minimal MQTT 3.1.1 broker
// ═══════════════════════════════════════════════════════════════

/// Прочитать один пакет: (тип, тело после fixed header).
async fn read_packet(socket: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = socket.read_u8().await?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = socket.read_u8().await?;
        len |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    socket.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

async fn read_until(socket: &mut TcpStream, kind: u8) -> Vec<u8> {
    loop {
        let (got, body) = read_packet(socket).await.expect("client went away");
        if got == kind {
            return body;
        }
    }
}

fn publish_packet(topic: &str, payload: &str) -> Vec<u8> {
    let len = 2 + topic.len() + payload.len();
    assert!(len < 128);
    let mut packet = vec![0x30, len as u8, 0, topic.len() as u8];
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload.as_bytes());
    packet
}

/// Брокер на один сеанс: CONNACK, SUBACK, одно сообщение с датчика,
/// ждёт republish и рвёт соединение. Возвращает тело republish.
async fn one_shot_broker(listener: TcpListener) -> Vec<u8> {
    let (mut socket, _) = listener.accept().await.expect("accept");

    read_until(&mut socket, CONNECT).await;
    socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.expect("connack");

    let subscribe = read_until(&mut socket, SUBSCRIBE).await;
    socket
        .write_all(&[0x90, 0x03, subscribe[0], subscribe[1], 0x00])
        .await
        .expect("suback");

    socket
        .write_all(&publish_packet("/sensor/temp", "temp,room=kitchen value=21.5"))
        .await
        .expect("publish");
    read_until(&mut socket, PUBLISH).await
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

/// Обрыв соединения после subscribe: relay завершается ошибкой,
/// брокер не переподключается молча, publish дальше падает.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_connection_halts_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = tokio::spawn(one_shot_broker(listener));

    let broker = timeout(WAIT, MqttBroker::connect(&ConnectOptions::new(format!("tcp://127.0.0.1:{port}"))))
        .await
        .expect("connect hung")
        .expect("connect");
    let broker = Arc::new(broker);

    let token = CancellationToken::new();
    let relay = Relay::start(broker.clone(), RelayConfig::default(), "#", Arc::new(TracingObserver), &token)
        .await
        .expect("relay start");

    let republished = timeout(WAIT, server).await.expect("broker hung").expect("broker task");
    let topic = b"/homeassistant/republished/kitchen/temp";
    assert_eq!(&republished[2..2 + topic.len()], topic);
    assert_eq!(&republished[2 + topic.len()..], b"21.5");

    let res = timeout(WAIT, relay.wait()).await.expect("relay kept running after connection loss");
    assert!(matches!(res, Err(PipelineError::QueueClosed("inbound"))), "got {res:?}");

    let err = broker
        .publish("/homeassistant/republished/kitchen/temp", QoS::AtMostOnce, false, "1")
        .await
        .expect_err("publish after connection loss");
    assert_eq!(err.kind(), ErrorKind::Publish);
}
