use serde::Deserialize;

use parrot_api::DecodeMode;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Relay Config
// ═══════════════════════════════════════════════════════════════

/// Правила republish'а: какие topic'и брать и куда их отправлять.
///
/// Все поля имеют значения по умолчанию, совпадающие со встроенным
/// поведением, так что `[relay]` секция в конфиге необязательна.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Префикс topic'ов, которые ingest обрабатывает. Остальные молча дропаются.
    #[serde(default = "default_sensor_prefix")]
    pub sensor_prefix: String,
    /// Namespace исходящих topic'ов: `<namespace>/<room>/<name>`.
    #[serde(default = "default_destination_namespace")]
    pub destination_namespace: String,
    /// Tag, значение которого становится сегментом комнаты.
    #[serde(default = "default_room_tag")]
    pub room_tag: String,
    /// Field, значение которого становится исходящим payload.
    #[serde(default = "default_value_field")]
    pub value_field: String,
    #[serde(default)]
    pub decode_mode: DecodeMode,
}

fn default_sensor_prefix() -> String {
    "/sensor/".into()
}
fn default_destination_namespace() -> String {
    "/homeassistant/republished".into()
}
fn default_room_tag() -> String {
    "room".into()
}
fn default_value_field() -> String {
    "value".into()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sensor_prefix: default_sensor_prefix(),
            destination_namespace: default_destination_namespace(),
            room_tag: default_room_tag(),
            value_field: default_value_field(),
            decode_mode: DecodeMode::default(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sensor_prefix.is_empty() {
            return Err(PipelineError::Config("relay.sensor_prefix must not be empty".into()));
        }
        if self.room_tag.is_empty() || self.value_field.is_empty() {
            return Err(PipelineError::Config(
                "relay.room_tag and relay.value_field must not be empty".into(),
            ));
        }
        if self.destination_namespace.ends_with('/') {
            return Err(PipelineError::Config(format!(
                "relay.destination_namespace '{}' must not end with '/'",
                self.destination_namespace
            )));
        }
        Ok(())
    }

    /// Исходящий topic для комнаты и имени измерения.
    pub fn destination_topic(&self, room: &str, name: &str) -> String {
        format!("{}/{room}/{name}", self.destination_namespace)
    }
}
