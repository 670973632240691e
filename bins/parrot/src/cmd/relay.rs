use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use broker_mqtt::MqttBroker;
use parrot_api::{Broker, ConnectOptions, RelayError};
use pipeline::{Relay, TracingObserver};

use crate::config::{Cli, ParrotConfig};
use crate::error::ParrotError;

pub async fn run(cli: Cli) -> Result<(), ParrotError> {
    // Адрес проверяется первым: без него не читаем конфиг и не подключаемся.
    let host = cli.host()?;
    let config = ParrotConfig::load(cli.config.as_deref())?;
    tracing::info!(config = ?cli.config, "parrot starting");
    serve(host, config, shutdown_signal(), connect_mqtt).await
}

async fn connect_mqtt(options: ConnectOptions) -> Result<Arc<dyn Broker>, RelayError> {
    let broker = MqttBroker::connect(&options).await?;
    Ok(Arc::new(broker))
}

/// Подключиться, запустить relay и работать до фатальной ошибки или `stop`.
///
/// При любом исходе после подключения брокер отключается с grace
/// периодом, затем выдерживается settle пауза.
pub(crate) async fn serve<C, F, S>(
    host: String,
    config: ParrotConfig,
    stop: S,
    connect: C,
) -> Result<(), ParrotError>
where
    C: FnOnce(ConnectOptions) -> F,
    F: Future<Output = Result<Arc<dyn Broker>, RelayError>>,
    S: Future<Output = std::io::Result<()>>,
{
    config.relay.validate()?;
    let broker_cfg = config.broker.clone();
    let options = broker_cfg.connect_options(host);

    tracing::info!(uri = %options.uri, client_id = %options.client_id, "connecting");
    let broker = connect(options).await.map_err(ParrotError::Connect)?;

    let token = CancellationToken::new();
    let result = match Relay::start(
        broker.clone(),
        config.relay,
        &broker_cfg.subscribe_filter,
        Arc::new(TracingObserver),
        &token,
    )
    .await
    {
        Ok(relay) => {
            tracing::info!("parrot ready");
            let wait = relay.wait();
            tokio::pin!(wait);
            tokio::select! {
                res = &mut wait => res.map_err(ParrotError::from),
                signal = stop => {
                    tracing::info!("shutting down...");
                    token.cancel();
                    let res = wait.await.map_err(ParrotError::from);
                    signal.map_err(ParrotError::from).and(res)
                }
            }
        }
        Err(e) => Err(e.into()),
    };

    broker.disconnect(broker_cfg.disconnect_grace()).await;
    tokio::time::sleep(broker_cfg.settle()).await;

    if result.is_ok() {
        tracing::info!("shutdown complete");
    }
    result
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = term.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parrot_api::{Envelope, QoS, ReceiptHandler};
    use pipeline::PipelineError;

    /// Брокер, который сразу после subscribe доставляет заданные сообщения.
    ///
    /// Receipt callback держится до конца теста, если не задан `hang_up`:
    /// тогда он отпускается после скрипта, как при обрыве соединения.
    #[derive(Default)]
    struct ScriptedBroker {
        inbound: Vec<(&'static str, &'static str)>,
        fail_publish: bool,
        hang_up: bool,
        handlers: Mutex<Vec<Arc<dyn ReceiptHandler>>>,
        published: Mutex<Vec<(String, String)>>,
        disconnected: AtomicBool,
    }

    impl Broker for ScriptedBroker {
        fn subscribe(
            &self,
            _filter: &str,
            _qos: QoS,
            handler: Arc<dyn ReceiptHandler>,
        ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
            let inbound = self.inbound.clone();
            Box::pin(async move {
                if !self.hang_up {
                    self.handlers.lock().unwrap().push(handler.clone());
                }
                tokio::spawn(async move {
                    for (topic, payload) in inbound {
                        if handler.deliver(Envelope::new(topic, payload, false)).await.is_err() {
                            break;
                        }
                    }
                });
                Ok(())
            })
        }

        fn publish(
            &self,
            topic: &str,
            _qos: QoS,
            _retain: bool,
            payload: &str,
        ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
            let call = (topic.to_string(), payload.to_string());
            Box::pin(async move {
                if self.fail_publish {
                    return Err(RelayError::publish("connection lost"));
                }
                self.published.lock().unwrap().push(call);
                Ok(())
            })
        }

        fn disconnect(&self, _grace: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move { self.disconnected.store(true, Ordering::SeqCst) })
        }
    }

    fn quick_config() -> ParrotConfig {
        let mut config = ParrotConfig::default();
        config.broker.settle_ms = 0;
        config
    }

    #[tokio::test]
    async fn missing_host_stops_before_connecting() {
        let err = run(Cli { mqtt_host: None, config: None }).await.unwrap_err();
        assert!(matches!(err, ParrotError::MissingHost));
    }

    #[tokio::test]
    async fn connect_failure_is_fatal() {
        let err = serve("tcp://h:1883".into(), quick_config(), std::future::pending(), |_| async {
            Err(RelayError::connection("refused"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ParrotError::Connect(_)));
    }

    #[tokio::test]
    async fn connector_receives_configured_options() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in = seen.clone();
        let broker = Arc::new(ScriptedBroker::default());
        let connected: Arc<dyn Broker> = broker.clone();

        let res = serve("tcp://h:1883".into(), quick_config(), async { Ok(()) }, move |opts| {
            *seen_in.lock().unwrap() = Some(opts);
            async move { Ok(connected) }
        })
        .await;

        assert!(res.is_ok());
        assert_eq!(seen.lock().unwrap().clone(), Some(ConnectOptions::new("tcp://h:1883")));
        assert!(broker.disconnected.load(Ordering::SeqCst));
    }

    /// Ошибка publish завершает serve с ошибкой и отключает брокер.
    #[tokio::test]
    async fn publish_failure_ends_with_error_and_disconnects() {
        let broker = Arc::new(ScriptedBroker {
            inbound: vec![
                ("/sensor/temp", "temp,room=kitchen value=21.5"),
                ("/sensor/temp", "temp,room=attic value=30"),
            ],
            fail_publish: true,
            ..Default::default()
        });
        let connected: Arc<dyn Broker> = broker.clone();

        let res = tokio::time::timeout(
            Duration::from_secs(2),
            serve("tcp://h:1883".into(), quick_config(), std::future::pending(), |_| async move {
                Ok(connected)
            }),
        )
        .await
        .expect("serve hung");

        assert!(matches!(res, Err(ParrotError::Pipeline(PipelineError::Publish { .. }))));
        assert!(broker.published.lock().unwrap().is_empty());
        assert!(broker.disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn republishes_until_stopped() {
        let broker = Arc::new(ScriptedBroker {
            inbound: vec![
                ("/sensor/temp", "temp,room=kitchen value=21.5"),
                ("zigbee/state", "online"),
            ],
            ..Default::default()
        });
        let connected: Arc<dyn Broker> = broker.clone();
        let published = Arc::new(AtomicUsize::new(0));

        let stop = {
            let broker = broker.clone();
            let published = published.clone();
            async move {
                while broker.published.lock().unwrap().is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                published.store(broker.published.lock().unwrap().len(), Ordering::SeqCst);
                Ok(())
            }
        };

        let res = tokio::time::timeout(
            Duration::from_secs(2),
            serve("tcp://h:1883".into(), quick_config(), stop, |_| async move { Ok(connected) }),
        )
        .await
        .expect("serve hung");

        assert!(res.is_ok(), "{res:?}");
        assert_eq!(published.load(Ordering::SeqCst), 1);
        assert_eq!(
            broker.published.lock().unwrap().as_slice(),
            &[("/homeassistant/republished/kitchen/temp".to_string(), "21.5".to_string())]
        );
        assert!(broker.disconnected.load(Ordering::SeqCst));
    }

    /// Брокер отпустил receipt callback без остановки: serve падает, а не висит.
    #[tokio::test]
    async fn lost_receipt_callback_ends_with_error() {
        let broker = Arc::new(ScriptedBroker {
            inbound: vec![("/sensor/temp", "temp,room=kitchen value=21.5")],
            hang_up: true,
            ..Default::default()
        });
        let connected: Arc<dyn Broker> = broker.clone();

        let res = tokio::time::timeout(
            Duration::from_secs(2),
            serve("tcp://h:1883".into(), quick_config(), std::future::pending(), |_| async move {
                Ok(connected)
            }),
        )
        .await
        .expect("serve hung");

        assert!(
            matches!(res, Err(ParrotError::Pipeline(PipelineError::QueueClosed("inbound")))),
            "{res:?}"
        );
        assert_eq!(broker.published.lock().unwrap().len(), 1);
        assert!(broker.disconnected.load(Ordering::SeqCst));
    }
}
