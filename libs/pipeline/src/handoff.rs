use tokio::sync::{mpsc, oneshot};

// ═══════════════════════════════════════════════════════════════
//  Rendezvous hand-off channel
// ═══════════════════════════════════════════════════════════════
//
// tokio mpsc не умеет capacity 0, поэтому каждое значение едет вместе
// с oneshot-подтверждением: `send` завершается только когда получатель
// забрал значение. Буфер ёмкости 1 держит максимум одно значение, чей
// отправитель всё ещё ждёт ack.

struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Получатель закрыт; значение не было принято.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hand-off receiver closed")]
pub struct Closed;

pub struct HandoffSender<T> {
    tx: mpsc::Sender<Handoff<T>>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Handoff<T>>,
}

/// Создать rendezvous канал.
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

impl<T> HandoffSender<T> {
    /// Передать значение и дождаться, пока получатель его заберёт.
    pub async fn send(&self, value: T) -> Result<(), Closed> {
        let (taken, ack) = oneshot::channel();
        self.tx.send(Handoff { value, taken }).await.map_err(|_| Closed)?;
        ack.await.map_err(|_| Closed)
    }
}

impl<T> HandoffReceiver<T> {
    /// Следующее значение. None = все отправители закрыты.
    pub async fn recv(&mut self) -> Option<T> {
        let Handoff { value, taken } = self.rx.recv().await?;
        // Отправитель мог быть отменён, пока ждал ack; значение всё равно наше.
        let _ = taken.send(());
        Some(value)
    }
}
