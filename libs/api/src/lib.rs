pub mod broker;
pub mod error;
pub mod measurement;
pub mod types;

pub use broker::{Broker, ConnectOptions, ReceiptHandler, RelayObserver};
pub use error::{ErrorKind, RelayError};
pub use measurement::{DecodeError, DecodeMode, Measurement};
pub use types::{Envelope, QoS};
