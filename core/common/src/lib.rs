//! Common utilities and types shared across CredVault crates.
//!
//! This module provides the error taxonomy and the small value types
//! (identifiers, tree paths, secrets) used by every layer of the vault.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Identifier, NodePath, Secret};
