use tokio::sync::watch;

/// Requests cancellation of an in-flight read.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. Idempotent; later calls have no effect.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of an [`AbortHandle`], checked by the reader between chunk reads.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Creates a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx: Some(rx) })
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_aborted(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without aborting.
    pub async fn aborted(&self) {
        if let Some(rx) = &self.rx {
            let mut rx = rx.clone();
            if rx.wait_for(|aborted| *aborted).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}
