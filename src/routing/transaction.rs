//! Transactions pinned to a single backend
use crate::core::Transactional;
use crate::error::SwitchyardError;
use crate::routing::{Intent, RequestContext, Router};
use std::future::Future;

impl<B: Transactional> Router<B> {
    /// Run `body` inside a backend transaction
    ///
    /// The write route is resolved once and a transaction begun on it. `body`
    /// receives a context pinned to the transaction, so every route inside it
    /// returns the same connection whatever the intent. `Ok` commits, `Err`
    /// rolls back and is returned as is.
    ///
    /// If `ctx` is already pinned the body joins the running transaction;
    /// commit and rollback stay with the outer call.
    pub async fn with_transaction<T, E, F, Fut>(
        &self,
        ctx: &RequestContext<B::Connection>,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(RequestContext<B::Connection>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SwitchyardError>,
    {
        if ctx.is_pinned() {
            return body(ctx.clone()).await;
        }

        let handle = self.select(ctx.meta(), Intent::Write).await?;
        let backend = handle.backend();
        let tx = backend.begin().await.map_err(SwitchyardError::from)?;
        tracing::debug!(router = self.name(), backend = handle.name(), "transaction started");

        match body(ctx.pinned_to(tx.clone())).await {
            Ok(value) => {
                backend.commit(tx).await.map_err(SwitchyardError::from)?;
                tracing::debug!(router = self.name(), backend = handle.name(), "transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = backend.rollback(tx).await {
                    tracing::warn!(
                        router = self.name(),
                        backend = handle.name(),
                        error = %rollback,
                        "rollback failed"
                    );
                }
                Err(e)
            }
        }
    }
}
