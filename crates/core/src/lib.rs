//! Core domain types for ferry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content digests (`algorithm:hex`) and their computation
//! - Descriptors: the (media-type, digest, size) identity of a DAG node
//! - Platform metadata and matching
//! - The shared error type

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod media_type;

pub use descriptor::{Descriptor, Platform};
pub use digest::{Algorithm, Digest};
pub use error::{Error, Result};
