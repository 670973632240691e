use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parrot_api::{Broker, Envelope, QoS, RelayObserver};

use crate::handoff::HandoffReceiver;
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Egress stage — outbound queue → broker.publish()
// ═══════════════════════════════════════════════════════════════

/// Публикует исходящие envelope через брокер с QoS 0.
///
/// Ошибка publish фатальна: стадия останавливается сразу, без retry.
pub struct Egress {
    broker: Arc<dyn Broker>,
    observer: Arc<dyn RelayObserver>,
}

impl Egress {
    pub fn new(broker: Arc<dyn Broker>, observer: Arc<dyn RelayObserver>) -> Self {
        Self { broker, observer }
    }

    pub async fn publish(&self, envelope: &Envelope) -> Result<(), PipelineError> {
        self.broker
            .publish(envelope.topic(), QoS::AtMostOnce, envelope.retain(), envelope.payload())
            .await
            .map_err(|source| PipelineError::Publish { topic: envelope.topic().to_string(), source })?;
        self.observer.published(envelope);
        Ok(())
    }

    /// Цикл egress до закрытия outbound queue или отмены.
    pub async fn run(
        &self,
        mut outbound: HandoffReceiver<Envelope>,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                envelope = outbound.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.publish(&envelope).await?;
        }
        tracing::debug!("egress stopped");
        Ok(())
    }
}

/// Запустить egress как отдельный task.
pub fn spawn_egress_task(
    egress: Egress,
    outbound: HandoffReceiver<Envelope>,
    token: CancellationToken,
) -> JoinHandle<Result<(), PipelineError>> {
    tokio::spawn(async move { egress.run(outbound, token).await })
}
