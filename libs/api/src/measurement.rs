use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Decode mode
// ════════════════════════════════════════════════════════════════

/// Насколько строго разбирать line-protocol payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Никогда не падает: битый ввод деградирует до частичных/пустых map.
    #[default]
    Lenient,
    /// Падает на отсутствующих разделителях и пустых ключах.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("missing ',' between measurement name and tags")]
    MissingComma,

    #[error("missing ' ' between tag set and field set")]
    MissingSpace,

    #[error("empty measurement name")]
    EmptyName,

    #[error("{set} entry '{token}' is not a key=value pair")]
    MissingEquals { set: &'static str, token: String },

    #[error("{set} entry '{token}' has an empty key")]
    EmptyKey { set: &'static str, token: String },
}

// ════════════════════════════════════════════════════════════════
//  Measurement
// ════════════════════════════════════════════════════════════════

/// Разобранный line-protocol payload: `name,tag=v,... field=f,...`.
///
/// Значения полей остаются строками, числового приведения нет.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Measurement {
    pub name: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, String>,
}

impl Measurement {
    /// Разобрать payload в выбранном режиме.
    ///
    /// Порядок разбора: имя до первой `,`, затем tag set и field set
    /// до/после первого пробела, затем каждая пара по первому `=`.
    /// Повторяющийся ключ перезаписывается последним значением.
    pub fn decode(payload: &str, mode: DecodeMode) -> Result<Self, DecodeError> {
        if mode == DecodeMode::Lenient {
            return Ok(Self::decode_lenient(payload));
        }

        let payload = payload.trim_end_matches(['\r', '\n']);
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }
        let (name, rest) = payload.split_once(',').ok_or(DecodeError::MissingComma)?;
        if name.is_empty() {
            return Err(DecodeError::EmptyName);
        }
        let (tags, fields) = rest.split_once(' ').ok_or(DecodeError::MissingSpace)?;

        Ok(Self {
            name: name.to_string(),
            tags: strict_pairs(tags, "tag")?,
            fields: strict_pairs(fields, "field")?,
        })
    }

    /// Lenient decode, который не может упасть.
    pub fn decode_lenient(payload: &str) -> Self {
        let payload = payload.trim_end_matches(['\r', '\n']);
        let (name, rest) = payload.split_once(',').unwrap_or((payload, ""));
        let (tags, fields) = rest.split_once(' ').unwrap_or((rest, ""));
        Self {
            name: name.to_string(),
            tags: lenient_pairs(tags),
            fields: lenient_pairs(fields),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

fn lenient_pairs(list: &str) -> HashMap<String, String> {
    list.split(',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (k, v) = token.split_once('=').unwrap_or((token, ""));
            (k.to_string(), v.to_string())
        })
        .collect()
}

fn strict_pairs(list: &str, set: &'static str) -> Result<HashMap<String, String>, DecodeError> {
    let mut map = HashMap::new();
    for token in list.split(',') {
        let Some((k, v)) = token.split_once('=') else {
            return Err(DecodeError::MissingEquals { set, token: token.to_string() });
        };
        if k.is_empty() {
            return Err(DecodeError::EmptyKey { set, token: token.to_string() });
        }
        map.insert(k.to_string(), v.to_string());
    }
    Ok(map)
}
