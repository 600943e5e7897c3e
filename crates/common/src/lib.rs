//! Shared types for the generation gateway workspace
//!
//! `Secret` keeps credential material out of logs and `Debug` output;
//! `Error` covers configuration loading for the service binary.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
