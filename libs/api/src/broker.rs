use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::{Envelope, QoS, RelayError};

// ════════════════════════════════════════════════════════════════
//  Broker collaborator traits
// ════════════════════════════════════════════════════════════════

/// Параметры подключения к брокеру.
///
/// Транспорт, keepalive и reconnect остаются заботой реализации; core
/// задаёт только идентичность клиента и таймауты.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// URI брокера, e.g. `tcp://127.0.0.1:1883`.
    pub uri: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub ping_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: "parrot".to_string(),
            keep_alive: Duration::from_secs(2),
            ping_timeout: Duration::from_secs(1),
        }
    }
}

/// Получатель входящих сообщений, зарегистрированный через `Broker::subscribe`.
///
/// Брокер вызывает `deliver` со своего внутреннего task'а, по одному
/// сообщению за раз, в порядке получения. Future завершается, когда
/// сообщение принято получателем (back-pressure на доставку брокера).
pub trait ReceiptHandler: Send + Sync {
    /// Err = получатель закрыт, дальнейшие доставки бессмысленны.
    fn deliver(&self, envelope: Envelope) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>>;
}

/// Подключённый клиент pub/sub брокера.
///
/// Handle безопасен для одновременного использования receipt-путём
/// (чтение) и egress (publish); core не добавляет своей синхронизации.
pub trait Broker: Send + Sync {
    /// Подписаться на topic filter. Резолвится после подтверждения брокером.
    fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        handler: Arc<dyn ReceiptHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>>;

    /// Опубликовать payload в topic.
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>>;

    /// Отключиться, дав in-flight сообщениям не больше `grace`.
    fn disconnect(&self, grace: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Наблюдатель за стадиями pipeline (инжектируемый логгер).
///
/// Production-реализация пишет в tracing; тесты подменяют её
/// захватывающей реализацией.
pub trait RelayObserver: Send + Sync {
    /// Сообщение пришло из inbound queue.
    fn received(&self, _envelope: &Envelope) {}

    /// Сообщение не прошло topic-фильтр.
    fn filtered(&self, _envelope: &Envelope) {}

    /// Ingest построил исходящее сообщение.
    fn transformed(&self, _from: &Envelope, _to: &Envelope) {}

    /// Egress успешно опубликовал сообщение.
    fn published(&self, envelope: &Envelope);
}
