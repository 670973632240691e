pub mod config;
pub mod error;
pub mod handoff;
mod egress;
mod ingest;
mod observe;
mod relay;

pub use config::RelayConfig;
pub use error::PipelineError;
pub use egress::{Egress, spawn_egress_task};
pub use ingest::{Ingest, spawn_ingest_task};
pub use observe::TracingObserver;
pub use relay::{InboundQueue, Relay};
