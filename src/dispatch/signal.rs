use tokio::sync::watch;

/// One-way latch shared between the dispatcher and its connectors. Pushing
/// is idempotent and the state is monotone: once raised it stays raised for
/// as long as any observer is alive. Any number of tasks may await it.
#[derive(Debug, Clone)]
pub struct SignalButton {
    tx: watch::Sender<bool>,
}

impl SignalButton {
    pub fn new() -> SignalButton {
        let (tx, _) = watch::channel(false);
        SignalButton { tx }
    }

    pub fn push(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_pushed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the button has been pushed, immediately if it already
    /// was. Cancel-safe: dropping the future loses nothing.
    pub async fn pushed(&self) {
        let mut rx = self.tx.subscribe();
        // cannot fail: self holds the sender for the receiver's lifetime
        let _ = rx.wait_for(|pushed| *pushed).await;
    }
}

impl Default for SignalButton {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn push_is_idempotent_and_observable() {
        let button = SignalButton::new();
        assert!(!button.is_pushed());

        button.push();
        button.push();
        assert!(button.is_pushed());

        // resolves immediately even though the pushes happened before the wait
        tokio::time::timeout(Duration::from_secs(1), button.pushed())
            .await
            .expect("pushed() resolves after push");
    }

    #[tokio::test]
    async fn waiters_before_the_push_are_woken() {
        let button = SignalButton::new();
        let waiter = {
            let button = button.clone();
            tokio::spawn(async move { button.pushed().await })
        };
        button.push();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter wakes")
            .unwrap();
    }
}
