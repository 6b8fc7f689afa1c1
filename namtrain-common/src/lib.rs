//! namtrain-common - shared types and utilities for the NAM trainer service
//!
//! Holds the pieces that are independent of the HTTP layer: the common error
//! type, data-folder resolution, and timestamp helpers.

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
