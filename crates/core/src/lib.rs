#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and logic for the mcpforge generation pipeline.

pub mod api;
pub mod error;
pub mod model;
pub mod protocol;
pub mod validation;

mod util;

pub use error::{ForgeError, ForgeResult};
pub use util::{new_ulid, now_ms};
