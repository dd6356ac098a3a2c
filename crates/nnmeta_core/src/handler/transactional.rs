//! Retrying handler for cached, transactional work.

use super::lock::{LockKind, Namesystem, NamesystemGuard};
use super::OperationKind;
use crate::config::Config;
use crate::error::{CoreResult, ErrorKind};
use crate::manager::EntityManager;
use nnmeta_storage::LockMode;

/// Runs a unit of work inside an [`EntityManager`] transaction.
///
/// One invocation moves through
/// `lock -> begin -> run -> commit | rollback -> unlock`, and then either
/// returns or starts over from `lock` when the failure was retryable and the
/// budget allows another attempt.
///
/// Failures are handled by [`ErrorKind`]:
/// - `Fatal`: rolled back and returned, never retried;
/// - `Retryable` and `BackendFailure`: rolled back and retried;
/// - `Domain`: the work's writes are committed and the error is returned
///   after cleanup.
#[derive(Clone, Copy)]
pub struct TransactionalRequestHandler<'a> {
    op: OperationKind,
    attempts: u32,
    namesystem: Option<(&'a dyn Namesystem, LockKind)>,
    lock_mode: Option<LockMode>,
}

impl<'a> TransactionalRequestHandler<'a> {
    /// Creates a handler for `op` with the configured retry budget.
    #[must_use]
    pub fn new(op: OperationKind, config: &Config) -> Self {
        Self {
            op,
            attempts: config.attempts(),
            namesystem: None,
            lock_mode: None,
        }
    }

    /// Takes the namesystem read lock around every attempt.
    #[must_use]
    pub fn with_read_lock(mut self, namesystem: &'a dyn Namesystem) -> Self {
        self.namesystem = Some((namesystem, LockKind::Read));
        self
    }

    /// Takes the namesystem write lock around every attempt.
    #[must_use]
    pub fn with_write_lock(mut self, namesystem: &'a dyn Namesystem) -> Self {
        self.namesystem = Some((namesystem, LockKind::Write));
        self
    }

    /// Runs the transaction under `mode` instead of the manager's default.
    #[must_use]
    pub const fn with_lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = Some(mode);
        self
    }

    /// Returns the operation label.
    #[must_use]
    pub const fn operation(&self) -> OperationKind {
        self.op
    }

    /// Runs `work` in a transaction on `em`, retrying as its errors allow.
    ///
    /// # Errors
    ///
    /// Returns a fatal or domain error at once, and the last retryable
    /// error once the budget is exhausted.
    pub fn handle<R, F>(&self, em: &mut EntityManager, mut work: F) -> CoreResult<R>
    where
        F: FnMut(&mut EntityManager) -> CoreResult<R>,
    {
        let namenode = self.namesystem.and_then(|(ns, _)| ns.namenode_id());
        let mut attempt = 0;
        loop {
            attempt += 1;
            let span = tracing::info_span!("request", op = %self.op, attempt, namenode);
            let _entered = span.enter();

            let result = {
                let _guard = self
                    .namesystem
                    .map(|(ns, kind)| NamesystemGuard::acquire(ns, kind));
                self.attempt(em, &mut work)
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    tracing::warn!(
                        error = %err,
                        remaining = self.attempts - attempt,
                        "transaction failed, retrying"
                    );
                }
                Err(err) => {
                    if err.kind() != ErrorKind::Domain {
                        tracing::error!(error = %err, kind = %err.kind(), "transaction failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    fn attempt<R, F>(&self, em: &mut EntityManager, work: &mut F) -> CoreResult<R>
    where
        F: FnMut(&mut EntityManager) -> CoreResult<R>,
    {
        let previous = em.lock_mode();
        if let Some(mode) = self.lock_mode {
            em.set_lock_mode(mode);
        }
        let result = Self::run(em, work);
        em.set_lock_mode(previous);
        result
    }

    fn run<R, F>(em: &mut EntityManager, work: &mut F) -> CoreResult<R>
    where
        F: FnMut(&mut EntityManager) -> CoreResult<R>,
    {
        em.begin()?;
        tracing::debug!(tx = %em.transaction_id(), "tx started");

        match work(em) {
            Ok(value) => {
                em.commit()?;
                tracing::debug!("tx committed");
                Ok(value)
            }
            Err(err) if !err.kind().requires_rollback() => {
                em.commit()?;
                Err(err)
            }
            Err(err) => {
                if let Err(rollback) = em.rollback() {
                    tracing::error!(error = %rollback, "could not roll back transaction");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for TransactionalRequestHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalRequestHandler")
            .field("op", &self.op)
            .field("attempts", &self.attempts)
            .field("namesystem_lock", &self.namesystem.map(|(_, kind)| kind))
            .field("lock_mode", &self.lock_mode)
            .finish()
    }
}
