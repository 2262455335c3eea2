//! Core Stash types and traits.
//!
//! This crate defines the pieces shared by every Stash crate:
//!
//! - The error vocabulary (`StashError`) every operation reports through.
//! - Entries (`Entry`, `EntryKind`), the caller-facing view of a file or folder.
//! - The path sandbox (`sandbox::resolve`), the single place where untrusted
//!   relative paths are turned into filesystem paths.
//! - Identity tokens (`token::TokenCodec`), which bind a request to exactly
//!   one namespace.
//!
//! ## Wire-visible types
//!
//! `Entry` is serialized to JSON for HTTP clients, and the token format is a
//! contract between `TokenCodec::issue` and `TokenCodec::verify`. Changing
//! either is a protocol change.

pub mod entry;
pub mod error;
pub mod sandbox;
pub mod token;

pub use entry::{Entry, EntryKind};
pub use error::{StashError, StashResult};
pub use sandbox::ResolvedPath;
pub use token::{SigningKey, TokenCodec};
