use parrot_api::{Envelope, RelayObserver};

/// Observer по умолчанию: пишет события стадий в tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RelayObserver for TracingObserver {
    fn received(&self, envelope: &Envelope) {
        tracing::debug!(topic = %envelope.topic(), payload = %envelope.payload(), "received");
    }

    fn filtered(&self, envelope: &Envelope) {
        tracing::trace!(topic = %envelope.topic(), "topic outside sensor prefix, dropped");
    }

    fn transformed(&self, from: &Envelope, to: &Envelope) {
        tracing::debug!(
            topic = %from.topic(),
            payload = %from.payload(),
            republish_topic = %to.topic(),
            republish_payload = %to.payload(),
            "transformed"
        );
    }

    fn published(&self, envelope: &Envelope) {
        tracing::info!(topic = %envelope.topic(), payload = %envelope.payload(), "published");
    }
}
