//! # nnmeta Testkit
//!
//! Test utilities for nnmeta.
//!
//! This crate provides:
//! - Cluster fixtures over a shared in-memory database
//! - Property-based test generators using proptest
//! - Cross-crate integration checks for transaction visibility
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use nnmeta_testkit::prelude::*;
//!
//! with_cluster(|cluster| {
//!     let mut first = cluster.namenode("nn1:8020");
//!     let mut second = cluster.namenode("nn2:8020");
//!     first.join();
//!     assert_eq!(second.join(), first.id());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
