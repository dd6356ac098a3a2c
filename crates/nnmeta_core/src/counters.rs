//! Cluster-wide named counters.
//!
//! Every helper here runs inside the caller's transaction. Increments rely
//! on the backend's row conflict detection; two namenodes bumping the same
//! counter concurrently end with one of them retrying.

use crate::context::CounterFinder;
use crate::error::CoreResult;
use crate::manager::EntityManager;
use nnmeta_storage::Counter;
use std::fmt;

/// The counters the namesystem keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum CounterId {
    /// Leader election rounds.
    Leader = 1,
    /// Block generation stamps.
    GenerationStamp = 2,
}

impl CounterId {
    /// Every counter.
    pub const ALL: [CounterId; 2] = [Self::Leader, Self::GenerationStamp];

    /// Returns the row id.
    #[must_use]
    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Returns the row name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Leader => "Leader Election",
            Self::GenerationStamp => "Generation Stamp",
        }
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the counter's value. A missing row reads as zero.
///
/// # Errors
///
/// Returns an error if the row could not be read.
pub fn current_counter_value(em: &mut EntityManager, counter: CounterId) -> CoreResult<i64> {
    Ok(em
        .find::<Counter>(&CounterFinder::ById(counter.id()))?
        .map_or(0, |row| row.value))
}

/// Increments the counter and returns the new value, creating the row at
/// one if it does not exist.
///
/// # Errors
///
/// Returns an error if the row could not be read or buffered.
pub fn next_counter_value(em: &mut EntityManager, counter: CounterId) -> CoreResult<i64> {
    match em.find::<Counter>(&CounterFinder::ById(counter.id()))? {
        Some(row) => {
            let value = row.value + 1;
            em.update(Counter::new(counter.id(), row.name.clone(), value))?;
            Ok(value)
        }
        None => {
            em.add(Counter::new(counter.id(), counter.name(), 1))?;
            Ok(1)
        }
    }
}

/// Sets the counter to `value`.
///
/// # Errors
///
/// Returns an error if the row could not be read or buffered.
pub fn set_counter_value(em: &mut EntityManager, counter: CounterId, value: i64) -> CoreResult<()> {
    let row = Counter::new(counter.id(), counter.name(), value);
    if em.find::<Counter>(&CounterFinder::ById(counter.id()))?.is_some() {
        em.update(row)?;
    } else {
        em.add(row)?;
    }
    Ok(())
}

/// Resets every counter to zero, creating missing rows.
///
/// # Errors
///
/// Returns an error if a row could not be read or buffered.
pub fn reset_counters(em: &mut EntityManager) -> CoreResult<()> {
    for counter in CounterId::ALL {
        set_counter_value(em, counter, 0)?;
    }
    tracing::info!("counters reset");
    Ok(())
}
