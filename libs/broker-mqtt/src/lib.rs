//! Broker collaborator на базе rumqttc.
//!
//! Сетевой task крутит `EventLoop`, входящие PUBLISH уходят в
//! dispatcher task, который по одному вызывает зарегистрированные
//! `ReceiptHandler` в порядке получения.
//!
//! Обрыв после CONNACK фатален: reconnect с clean session потерял бы
//! подписки. Сетевой task выходит, `EventLoop` дропается (publish дальше
//! падает), dispatcher отпускает receipt callback'и.

mod topic;
mod uri;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    NetworkOptions, Outgoing, Packet, SubscribeReasonCode,
};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;

use parrot_api::{Broker, ConnectOptions, Envelope, QoS, ReceiptHandler, RelayError};

pub use topic::matches;
pub use uri::{BrokerAddr, parse_broker_uri};

/// Ёмкость очереди запросов AsyncClient → EventLoop.
const REQUEST_CAPACITY: usize = 16;

type SubAckQueue = Arc<Mutex<VecDeque<oneshot::Sender<Result<(), RelayError>>>>>;

struct Route {
    filter: String,
    handler: Arc<dyn ReceiptHandler>,
}

// ═══════════════════════════════════════════════════════════════
//  MqttBroker
// ═══════════════════════════════════════════════════════════════

pub struct MqttBroker {
    client: AsyncClient,
    routes: Arc<RwLock<Vec<Route>>>,
    subacks: SubAckQueue,
    driver: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl MqttBroker {
    /// Подключиться и дождаться CONNACK.
    ///
    /// Ошибка подключения возвращается сразу, без повторов.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, RelayError> {
        let addr = parse_broker_uri(&options.uri)?;

        let mut mqtt = MqttOptions::new(&options.client_id, &addr.host, addr.port);
        mqtt.set_keep_alive(options.keep_alive);
        mqtt.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        let mut network = NetworkOptions::new();
        network.set_connection_timeout(options.ping_timeout.as_secs().max(1));
        eventloop.set_network_options(network);

        wait_connack(&mut eventloop).await?;
        tracing::info!(
            host = %addr.host,
            port = addr.port,
            client_id = %options.client_id,
            keep_alive = ?options.keep_alive,
            "connected to broker"
        );

        let routes = Arc::new(RwLock::new(Vec::new()));
        let subacks: SubAckQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        let dispatcher = tokio::spawn(dispatch(delivery_rx, routes.clone()));
        let driver = tokio::spawn(drive(eventloop, delivery_tx, subacks.clone()));

        Ok(Self { client, routes, subacks, driver, dispatcher })
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.driver.abort();
        self.dispatcher.abort();
    }
}

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), RelayError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(RelayError::connection(format!("broker refused connection: {:?}", ack.code)));
            }
            Ok(_) => {}
            Err(e) => return Err(RelayError::connection(format!("connect: {e}"))),
        }
    }
}

/// Сетевой task: крутит EventLoop до DISCONNECT или первой ошибки.
///
/// EventLoop поллится непрерывно, даже когда pipeline медленный:
/// иначе publish из egress встал бы на полной очереди запросов, а
/// egress ждёт, пока ingest освободит receipt callback.
async fn drive(
    mut eventloop: EventLoop,
    deliveries: mpsc::UnboundedSender<Envelope>,
    subacks: SubAckQueue,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let envelope = Envelope::new(
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload),
                    publish.retain,
                );
                if deliveries.send(envelope).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let result = if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err(RelayError::connection(format!("subscription {} rejected by broker", ack.pkid)))
                } else {
                    Ok(())
                };
                if let Some(waiter) = subacks.lock().await.pop_front() {
                    let _ = waiter.send(result);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                tracing::error!(error = %e, "broker connection lost");
                for waiter in subacks.lock().await.drain(..) {
                    let _ = waiter.send(Err(RelayError::connection(format!("connection lost: {e}"))));
                }
                break;
            }
        }
    }
    // Без EventLoop очередь запросов закрыта: publish/subscribe вернут ошибку.
    drop(eventloop);
    tracing::debug!("broker driver stopped");
}

/// Доставка входящих сообщений получателям, по одному и по порядку.
async fn dispatch(mut deliveries: mpsc::UnboundedReceiver<Envelope>, routes: Arc<RwLock<Vec<Route>>>) {
    while let Some(envelope) = deliveries.recv().await {
        let handlers: Vec<Arc<dyn ReceiptHandler>> = routes
            .read()
            .await
            .iter()
            .filter(|route| topic::matches(envelope.topic(), &route.filter))
            .map(|route| route.handler.clone())
            .collect();

        for handler in handlers {
            if let Err(e) = handler.deliver(envelope.clone()).await {
                tracing::debug!(topic = %envelope.topic(), error = %e, "delivery rejected");
            }
        }
    }
    // Сетевой task вышел: получатели больше ничего не дождутся.
    routes.write().await.clear();
}

fn mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

impl Broker for MqttBroker {
    fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        handler: Arc<dyn ReceiptHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        let filter = filter.to_string();
        Box::pin(async move {
            self.routes.write().await.push(Route { filter: filter.clone(), handler });

            let (waiter, acked) = oneshot::channel();
            self.subacks.lock().await.push_back(waiter);

            let result = match self.client.subscribe(filter.clone(), mqtt_qos(qos)).await {
                Ok(()) => acked
                    .await
                    .unwrap_or_else(|_| Err(RelayError::connection("broker driver stopped before SUBACK"))),
                Err(e) => {
                    self.subacks.lock().await.pop_back();
                    Err(RelayError::connection(format!("subscribe: {e}")))
                }
            };

            if result.is_err() {
                self.routes.write().await.retain(|route| route.filter != filter);
            }
            result
        })
    }

    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.as_bytes().to_vec();
        Box::pin(async move {
            self.client
                .publish(topic, mqtt_qos(qos), retain, payload)
                .await
                .map_err(|e| RelayError::publish(e.to_string()))
        })
    }

    fn disconnect(&self, grace: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(grace, self.client.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "disconnect request failed"),
                Err(_) => tracing::warn!(?grace, "disconnect request timed out"),
            }
            // Дать driver'у отправить DISCONNECT и уже отправленные PUBLISH.
            let _ = tokio::time::timeout(grace, async {
                while !self.driver.is_finished() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            self.driver.abort();
            self.dispatcher.abort();
            tracing::info!("disconnected from broker");
        })
    }
}
