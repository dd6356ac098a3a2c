//! Retrying handler for raw session work.

use super::OperationKind;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use nnmeta_storage::{ConnectorPool, Session};
use std::sync::Arc;

/// Runs a unit of work directly against a backend session.
///
/// No cache and no namesystem lock are involved. Each attempt draws a
/// fresh session, wraps the work in a backend transaction and commits it.
/// Retryable failures run the work again until the budget is spent; any
/// other failure is returned at once.
#[derive(Debug, Clone)]
pub struct LightWeightRequestHandler {
    op: OperationKind,
    pool: Arc<ConnectorPool>,
    attempts: u32,
}

impl LightWeightRequestHandler {
    /// Creates a handler for `op` with the configured retry budget.
    pub fn new(op: OperationKind, pool: Arc<ConnectorPool>, config: &Config) -> Self {
        Self {
            op,
            pool,
            attempts: config.attempts(),
        }
    }

    /// Returns the operation label.
    #[must_use]
    pub const fn operation(&self) -> OperationKind {
        self.op
    }

    /// Runs `work`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable one
    /// once the budget is exhausted.
    pub fn handle<R, F>(&self, mut work: F) -> CoreResult<R>
    where
        F: FnMut(&mut dyn Session) -> CoreResult<R>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let span = tracing::debug_span!("lightweight", op = %self.op, attempt);
            let _entered = span.enter();

            match self.attempt(&mut work) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    tracing::warn!(error = %err, remaining = self.attempts - attempt, "retrying");
                }
                Err(err) => {
                    tracing::error!(error = %err, kind = %err.kind(), "request failed");
                    return Err(err);
                }
            }
        }
    }

    fn attempt<R, F>(&self, work: &mut F) -> CoreResult<R>
    where
        F: FnMut(&mut dyn Session) -> CoreResult<R>,
    {
        let mut session = self.pool.obtain_session()?;
        session.begin()?;
        match work(session.as_mut()) {
            Ok(value) => {
                session.commit().map_err(CoreError::commit_failed)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = session.rollback() {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
