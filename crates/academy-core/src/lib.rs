//! Core types and trait definitions for the academy enrollment engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod achievement;
pub mod cohort;
pub mod course;
pub mod enrollment;
pub mod error;
pub mod progress;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result};
