//! Request handlers.
//!
//! A request handler wraps one unit of work, labels it with an
//! [`OperationKind`] and decides from the returned [`ErrorKind`] whether to
//! commit, roll back, retry or give up.
//!
//! - [`LightWeightRequestHandler`] runs against a raw backend session.
//! - [`TransactionalRequestHandler`] runs against an [`EntityManager`],
//!   optionally under the namesystem lock.
//!
//! [`ErrorKind`]: crate::ErrorKind
//! [`EntityManager`]: crate::EntityManager

mod lightweight;
mod lock;
mod operation;
mod transactional;

pub use lightweight::LightWeightRequestHandler;
pub use lock::{LockKind, Namesystem, NamesystemGuard, NamesystemLock};
pub use operation::OperationKind;
pub use transactional::TransactionalRequestHandler;
