//! Common utilities for yieldb
//!
//! This crate provides the error type shared by the yieldb crates.

pub mod error;

pub use error::{Result, YieldbError};
