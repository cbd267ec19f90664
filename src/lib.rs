//! Library interface for aurpull (aurp)
//!
//! Fetches AUR build recipes and snapshots, resolving every dependency that
//! no local pacman repository already provides.

pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod output;
pub mod recipe;
pub mod resolver;

pub use api::{AurClient, RemoteClient};
pub use config::Config;
pub use database::{Classification, Classifier};
pub use error::{AurError, Result};
pub use resolver::{Resolution, Resolver};
