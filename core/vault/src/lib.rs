//! Credential vault engine for CredVault.
//!
//! This crate provides:
//! - The in-memory group/entry tree
//! - Filter queries with first/all, recursive and regex modes
//! - Idempotent touch and delete mutations
//! - Listings returned to callers, with optional secret suppression
//! - The request orchestrator and a file-backed encrypted codec
//!
//! # Architecture
//! The engine never performs cryptography or file I/O itself. It works on
//! a [`Container`] obtained from a [`VaultCodec`]; the orchestrator decides
//! whether the container is saved or discarded at the end of a request.

pub mod codec;
pub mod config;
pub mod listing;
pub mod mutation;
pub mod orchestrator;
pub mod query;
pub mod request;
pub mod tree;

pub use codec::{Container, FileCodec, VaultCodec};
pub use config::{ContainerHeader, VaultVersion};
pub use listing::{EntryProjection, GroupProjection, Listing, ListingOptions, Projection};
pub use mutation::{EntryDraft, GroupAttributes, GroupTarget, Outcome};
pub use orchestrator::{Acquired, Operation, Orchestrator, Stage};
pub use query::{Filters, NodeRef, Query, Selection, TargetKind};
pub use request::{Failure, Found, Request, RequestFilters, RequestedState, Response};
pub use tree::{Entry, Group, Vault};
