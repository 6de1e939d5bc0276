#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for localpkg.
//!
//! Pure helper functions with no logging/tracing dependencies. Logging is
//! emitted by `localpkg-core` and configured by the CLI crate.

pub mod fs;
pub mod hash;
