use parrot_api::RelayError;

const DEFAULT_PORT: u16 = 1883;

/// Адрес брокера, разобранный из `MQTT_HOST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
}

/// Разобрать URI вида `tcp://host[:port]` или `mqtt://host[:port]`.
///
/// TLS и websocket схемы не поддерживаются: это конфигурационная ошибка.
pub fn parse_broker_uri(uri: &str) -> Result<BrokerAddr, RelayError> {
    let uri = uri.trim();
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| RelayError::config(format!("broker uri '{uri}' has no scheme, expected tcp://host:port")))?;

    match scheme.to_ascii_lowercase().as_str() {
        "tcp" | "mqtt" => {}
        other => {
            return Err(RelayError::config(format!(
                "broker uri '{uri}': unsupported scheme '{other}' (use tcp:// or mqtt://)"
            )));
        }
    }

    let authority = rest.trim_end_matches('/');
    if authority.is_empty() || authority.contains('/') || authority.contains('@') {
        return Err(RelayError::config(format!("broker uri '{uri}': expected host[:port]")));
    }

    // [::1]:1883
    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
        let (host, tail) = v6
            .split_once(']')
            .ok_or_else(|| RelayError::config(format!("broker uri '{uri}': unterminated ipv6 literal")))?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(RelayError::config(format!("broker uri '{uri}': expected host[:port]"))),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(RelayError::config(format!("broker uri '{uri}': empty host")));
    }
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| RelayError::config(format!("broker uri '{uri}': bad port '{p}': {e}")))?,
        None => DEFAULT_PORT,
    };

    Ok(BrokerAddr { host: host.to_string(), port })
}
