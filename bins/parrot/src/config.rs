use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use parrot_api::ConnectOptions;
use pipeline::RelayConfig;

use crate::error::ParrotError;

#[derive(Parser, Debug, Clone)]
#[command(name = "parrot", about = "Republish MQTT sensor readings to MQTT")]
pub struct Cli {
    /// URI брокера, e.g. `tcp://127.0.0.1:1883`.
    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// Необязательный TOML конфиг с секциями [relay] и [broker].
    #[arg(long, env = "PARROT_CONFIG")]
    pub config: Option<String>,
}

impl Cli {
    /// Адрес брокера; пустое значение считается отсутствующим.
    pub fn host(&self) -> Result<String, ParrotError> {
        self.mqtt_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .ok_or(ParrotError::MissingHost)
    }
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParrotConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Topic filter входящей подписки.
    #[serde(default = "default_subscribe_filter")]
    pub subscribe_filter: String,
    /// Сколько ждать in-flight сообщения при disconnect.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
    /// Пауза после disconnect перед выходом.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_client_id() -> String {
    "parrot".into()
}
fn default_keep_alive_secs() -> u64 {
    2
}
fn default_ping_timeout_secs() -> u64 {
    1
}
fn default_subscribe_filter() -> String {
    "#".into()
}
fn default_disconnect_grace_ms() -> u64 {
    250
}
fn default_settle_ms() -> u64 {
    1000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            subscribe_filter: default_subscribe_filter(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn connect_options(&self, uri: String) -> ConnectOptions {
        ConnectOptions {
            uri,
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
        }
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl ParrotConfig {
    /// Загрузить конфиг; без пути используются значения по умолчанию.
    pub fn load(path: Option<&str>) -> Result<Self, ParrotError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| ParrotError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|detail| ParrotError::Config { context: "parse", detail: format!("'{path}': {detail}") })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.broker.client_id.is_empty() {
            return Err("broker.client_id must not be empty".into());
        }
        if config.broker.subscribe_filter.is_empty() {
            return Err("broker.subscribe_filter must not be empty".into());
        }
        Ok(config)
    }
}
