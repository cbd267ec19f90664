//! Command implementations for the aurp CLI
//!
//! - **query**: AUR search and package information
//! - **deps**: Direct dependency listing with classification
//! - **download**: Recursive fetch and extraction
//! - **utilities**: Shell completions

pub mod deps;
pub mod download;
pub mod query;
pub mod utilities;

pub use deps::deps;
pub use download::download;
pub use query::{info, search};
pub use utilities::completions;
