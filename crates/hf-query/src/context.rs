//! Cancellation scope and the per-query fetch context

use std::future::Future;
use std::sync::Arc;

use hf_core::{ApiError, EngineConfig, HistorianApi};
use tokio::sync::watch;
use tracing::debug;

use crate::QueryError;

/// Cancellation flag shared by every task of a request
///
/// Clones observe the same flag. A [`child`](Self::child) scope is
/// cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone)]
pub struct CancelScope {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// `Err(Cancelled)` once the scope is cancelled
    pub fn check(&self) -> Result<(), QueryError> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the scope is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// A scope cancelled together with this one
    ///
    /// Must be called from within a tokio runtime.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut parent = self.receiver.clone();
        let sender = Arc::clone(&child.sender);
        tokio::spawn(async move {
            let parent_cancelled = tokio::select! {
                result = parent.wait_for(|cancelled| *cancelled) => result.is_ok(),
                _ = sender.closed() => false,
            };
            if parent_cancelled {
                sender.send_replace(true);
            }
        });
        child
    }

    /// Run `future` unless the scope is cancelled first
    pub async fn run<T, F>(&self, future: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(QueryError::Cancelled),
            result = future => result,
        }
    }
}

/// What every handler needs to talk to the historian
#[derive(Clone)]
pub struct QueryContext {
    pub api: Arc<dyn HistorianApi>,
    pub config: Arc<EngineConfig>,
    pub scope: CancelScope,
}

impl QueryContext {
    pub fn new(api: Arc<dyn HistorianApi>, config: Arc<EngineConfig>, scope: CancelScope) -> Self {
        Self { api, config, scope }
    }

    /// Same API and config under another scope
    pub fn with_scope(&self, scope: CancelScope) -> Self {
        Self {
            api: Arc::clone(&self.api),
            config: Arc::clone(&self.config),
            scope,
        }
    }

    /// Await an API call, giving up when the scope is cancelled
    pub async fn fetch<T, F>(&self, call: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let result = self.scope.run(async { call.await.map_err(QueryError::from) }).await;
        if let Err(QueryError::Cancelled) = &result {
            debug!("fetch from {} cancelled", self.api.source_name());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_after_cancel() {
        let scope = CancelScope::new();
        scope.cancel();
        let result = scope.run(async { Ok::<_, QueryError>(1) }).await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let scope = CancelScope::new();
        let waiting = scope.clone();
        let task = tokio::spawn(async move {
            waiting
                .run(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, QueryError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = CancelScope::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent() {
        let parent = CancelScope::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
