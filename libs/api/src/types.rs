use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Quality of Service
// ════════════════════════════════════════════════════════════════

/// Уровень гарантии доставки для publish/subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// QoS 0: fire and forget.
    #[default]
    AtMostOnce,
    /// QoS 1.
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
}

impl QoS {
    /// Числовой уровень, как он передаётся брокеру.
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl std::fmt::Display for QoS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "qos{}", self.level())
    }
}

// ════════════════════════════════════════════════════════════════
//  Envelope
// ════════════════════════════════════════════════════════════════

/// Одно pub/sub сообщение, проходящее через relay.
///
/// Неизменяемо после создания: стадии pipeline строят новые
/// Envelope вместо мутации полученных. Payload: непрозрачные байты
/// брокера, интерпретированные как текст.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    topic: String,
    payload: String,
    retain: bool,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn retain(&self) -> bool {
        self.retain
    }
}
