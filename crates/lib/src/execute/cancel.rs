//! Cooperative cancellation.

use tokio::sync::watch;

/// Requests cancellation of a running build.
#[derive(Debug)]
pub struct CancelHandle {
  tx: watch::Sender<bool>,
}

/// Observes a [`CancelHandle`]. Cheap to clone; one per running step.
#[derive(Debug, Clone)]
pub struct CancelToken {
  rx: watch::Receiver<bool>,
}

impl CancelHandle {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(false);
    Self { tx }
  }

  pub fn token(&self) -> CancelToken {
    CancelToken { rx: self.tx.subscribe() }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }
}

impl Default for CancelHandle {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelToken {
  /// A token that is never cancelled.
  pub fn never() -> Self {
    let (_, rx) = watch::channel(false);
    Self { rx }
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once cancellation is requested; never resolves if the handle
  /// is dropped without cancelling.
  pub async fn cancelled(&mut self) {
    loop {
      if *self.rx.borrow_and_update() {
        return;
      }
      if self.rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }
}
