use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parrot_api::{DecodeMode, Envelope, Measurement, RelayObserver};

use crate::config::RelayConfig;
use crate::handoff::{HandoffReceiver, HandoffSender};
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Ingest stage — inbound queue → filter → decode → outbound queue
// ═══════════════════════════════════════════════════════════════

/// Фильтрует входящие envelope по topic'у и переводит line-protocol
/// payload в republish-сообщение.
pub struct Ingest {
    config: RelayConfig,
    observer: Arc<dyn RelayObserver>,
}

impl Ingest {
    pub fn new(config: RelayConfig, observer: Arc<dyn RelayObserver>) -> Self {
        Self { config, observer }
    }

    /// Один шаг ingest: None = topic вне sensor prefix.
    ///
    /// В strict режиме ошибка декодирования и отсутствие room tag /
    /// value field фатальны, в lenient подставляется пустая строка.
    pub fn transform(&self, envelope: &Envelope) -> Result<Option<Envelope>, PipelineError> {
        if !envelope.topic().starts_with(&self.config.sensor_prefix) {
            self.observer.filtered(envelope);
            return Ok(None);
        }

        let measurement = Measurement::decode(envelope.payload(), self.config.decode_mode)
            .map_err(|source| PipelineError::Decode { topic: envelope.topic().to_string(), source })?;

        let room = self.lookup(envelope, measurement.tag(&self.config.room_tag), "tag", &self.config.room_tag)?;
        let value = self.lookup(envelope, measurement.field(&self.config.value_field), "field", &self.config.value_field)?;

        let out = Envelope::new(
            self.config.destination_topic(room, &measurement.name),
            value,
            false,
        );
        self.observer.transformed(envelope, &out);
        Ok(Some(out))
    }

    fn lookup<'a>(
        &self,
        envelope: &Envelope,
        found: Option<&'a str>,
        set: &'static str,
        key: &str,
    ) -> Result<&'a str, PipelineError> {
        match (found, self.config.decode_mode) {
            (Some(v), _) => Ok(v),
            (None, DecodeMode::Lenient) => Ok(""),
            (None, DecodeMode::Strict) => Err(PipelineError::MissingKey {
                topic: envelope.topic().to_string(),
                set,
                key: key.to_string(),
            }),
        }
    }

    /// Цикл ingest до отмены.
    ///
    /// Отмена проверяется только между сообщениями: принятое сообщение
    /// всегда доводится до outbound send. Inbound queue закрывается
    /// без отмены только когда брокер потерял соединение, это фатально.
    pub async fn run(
        &self,
        mut inbound: HandoffReceiver<Envelope>,
        outbound: HandoffSender<Envelope>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                envelope = inbound.recv() => match envelope {
                    Some(envelope) => envelope,
                    None if token.is_cancelled() => break,
                    None => return Err(PipelineError::QueueClosed("inbound")),
                },
            };
            self.observer.received(&envelope);

            let Some(out) = self.transform(&envelope)? else {
                continue;
            };
            if outbound.send(out).await.is_err() {
                if token.is_cancelled() {
                    break;
                }
                return Err(PipelineError::QueueClosed("outbound"));
            }
        }
        tracing::debug!("ingest stopped");
        Ok(())
    }
}

/// Запустить ingest как отдельный task.
pub fn spawn_ingest_task(
    ingest: Ingest,
    inbound: HandoffReceiver<Envelope>,
    outbound: HandoffSender<Envelope>,
    token: CancellationToken,
) -> JoinHandle<Result<(), PipelineError>> {
    tokio::spawn(async move { ingest.run(inbound, outbound, token).await })
}
