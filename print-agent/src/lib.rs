//! print-agent library crate.
//!
//! Watches a remote job queue and drives each print order through retrieval,
//! conversion to PDF, layout and transforms, and print dispatch, writing the
//! job's status back as it goes.

pub mod config;
pub mod convert;
pub mod domain;
pub mod error;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod printing;
pub mod queue;
pub mod retriever;
pub mod staging;
pub mod transform;
pub mod utils;

pub use error::{Error, Result};
