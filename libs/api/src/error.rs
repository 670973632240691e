/// Категория ошибки брокера. Все категории в parrot фатальны,
/// различаются только лог и контекст в сообщении.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Кривой URI или опции подключения, падаем до connect.
    Config,
    /// Connect/subscribe не прошёл или соединение потеряно.
    Connection,
    /// Брокер не принял publish или клиент уже остановлен.
    Publish,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Publish => f.write_str("publish"),
        }
    }
}

/// Ошибка операции брокера: категория плюс текст для лога.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayError {
    kind: ErrorKind,
    message: String,
}

impl RelayError {
    fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Ошибка конфигурации: постоянная, падаем на старте.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    /// Ошибка соединения (connect, subscribe, обрыв).
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, msg)
    }

    /// Ошибка публикации: брокер отклонил или клиент закрыт.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Publish, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Debug for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RelayError {}
