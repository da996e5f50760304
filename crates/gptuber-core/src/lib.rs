pub mod canned;
pub mod collab;
pub mod config;
pub mod emotes;
pub mod error;
pub mod mora;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod segment;
pub mod text;
pub mod timeline;
pub mod tokenizer;
pub mod types;

pub use error::{GptuberError, Result};
