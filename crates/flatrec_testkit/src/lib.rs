//! # FlatRec Testkit
//!
//! Test utilities for FlatRec.
//!
//! This crate provides:
//! - Sample schemas and store fixtures
//! - Property-based test generators using proptest
//! - Fuzz harnesses for buffers and store operations
//! - Test vectors with known bytes
//!
//! ## Usage
//!
//! ```
//! use flatrec_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     let demos = store.entity_box::<compression_demo::Record>().unwrap();
//!     demos.put(&mut demo_record(0, 1000, &[1, 2, 3])).unwrap();
//!     assert_eq!(demos.count().unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use vectors::*;
