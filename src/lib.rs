pub mod answer;
pub mod api;
pub mod audit;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod prompt;
pub mod retrieval;
pub mod vectorstore;


pub use error::{RagError, Result};
