use parrot_api::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum ParrotError {
    #[error("parrot needs `MQTT_HOST` set in the environment to a value such as `tcp://127.0.0.1:1883`")]
    MissingHost,

    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("connect: {0}")]
    Connect(RelayError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
