//! Configuration for the notpixel bot
//!
//! Provides types, discovery and loading for `notpixel.toml`.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
