use parrot_api::{DecodeError, RelayError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("decode ({topic}): {source}")]
    Decode { topic: String, source: DecodeError },

    #[error("decode ({topic}): {set} '{key}' missing")]
    MissingKey { topic: String, set: &'static str, key: String },

    #[error("subscribe ({filter}): {source}")]
    Subscribe { filter: String, source: RelayError },

    #[error("publish ({topic}): {source}")]
    Publish { topic: String, source: RelayError },

    #[error("{0} queue closed")]
    QueueClosed(&'static str),

    #[error("stage task: {0}")]
    Task(#[from] tokio::task::JoinError),
}
