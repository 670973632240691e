use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parrot_api::{Broker, Envelope, QoS, ReceiptHandler, RelayError, RelayObserver};

use crate::config::RelayConfig;
use crate::egress::{Egress, spawn_egress_task};
use crate::handoff::{self, HandoffSender};
use crate::ingest::{Ingest, spawn_ingest_task};
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Receipt callback → inbound queue
// ═══════════════════════════════════════════════════════════════

/// Receipt callback брокера: каждое входящее сообщение (любой topic)
/// уходит в inbound queue. `deliver` ждёт, пока ingest его заберёт.
pub struct InboundQueue {
    tx: HandoffSender<Envelope>,
}

impl ReceiptHandler for InboundQueue {
    fn deliver(&self, envelope: Envelope) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        Box::pin(async move {
            self.tx
                .send(envelope)
                .await
                .map_err(|_| RelayError::connection("inbound queue closed"))
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Relay — wiring of ingest + egress around one broker handle
// ═══════════════════════════════════════════════════════════════

/// Запущенный pipeline: broker → inbound → ingest → outbound → egress → broker.
///
/// Обе очереди rendezvous: медленный egress тормозит ingest, тот
/// тормозит receipt callback и доставку брокера.
pub struct Relay {
    ingest: JoinHandle<Result<(), PipelineError>>,
    egress: JoinHandle<Result<(), PipelineError>>,
    token: CancellationToken,
}

impl Relay {
    /// Запустить стадии и подписаться на `filter`.
    ///
    /// Стадии стартуют до subscribe, чтобы первая доставка уже имела
    /// получателя. Ошибка subscribe останавливает стадии.
    pub async fn start(
        broker: Arc<dyn Broker>,
        config: RelayConfig,
        filter: &str,
        observer: Arc<dyn RelayObserver>,
        shutdown: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let token = shutdown.child_token();

        let (inbound_tx, inbound_rx) = handoff::channel();
        let (outbound_tx, outbound_rx) = handoff::channel();

        tracing::info!(
            sensor_prefix = %config.sensor_prefix,
            destination = %config.destination_namespace,
            decode_mode = ?config.decode_mode,
            "starting relay stages"
        );
        let ingest = spawn_ingest_task(
            Ingest::new(config, observer.clone()),
            inbound_rx,
            outbound_tx,
            token.clone(),
        );
        let egress = spawn_egress_task(Egress::new(broker.clone(), observer), outbound_rx, token.clone());

        let handler = Arc::new(InboundQueue { tx: inbound_tx });
        if let Err(source) = broker.subscribe(filter, QoS::AtMostOnce, handler).await {
            token.cancel();
            let _ = ingest.await;
            let _ = egress.await;
            return Err(PipelineError::Subscribe { filter: filter.to_string(), source });
        }
        tracing::info!(%filter, "subscribed");

        Ok(Self { ingest, egress, token })
    }

    /// Дождаться завершения pipeline.
    ///
    /// Возвращает первую фатальную ошибку стадии. Ok = pipeline
    /// остановлен отменой. Брокер, отпустивший receipt callback без
    /// отмены, даёт `QueueClosed("inbound")`.
    pub async fn wait(self) -> Result<(), PipelineError> {
        let Relay { mut ingest, mut egress, token } = self;

        tokio::select! {
            res = &mut egress => {
                // Egress вышел первым: ошибка publish или отмена.
                // Ingest может ждать inbound сколь угодно долго, будим его.
                token.cancel();
                let egress_res = joined(res);
                let ingest_res = joined(ingest.await);
                match (egress_res, ingest_res) {
                    (Err(e), _) => Err(e),
                    (Ok(()), Err(PipelineError::QueueClosed("outbound"))) => Ok(()),
                    (Ok(()), other) => other,
                }
            }
            res = &mut ingest => {
                match joined(res) {
                    Err(e) => {
                        token.cancel();
                        let _ = egress.await;
                        Err(e)
                    }
                    // outbound sender дропнут вместе с ingest → egress дренирует и выходит.
                    Ok(()) => joined(egress.await),
                }
            }
        }
    }
}

fn joined(
    res: Result<Result<(), PipelineError>, tokio::task::JoinError>,
) -> Result<(), PipelineError> {
    res?
}
