//! # helmsman-core
//!
//! Core types shared across the helmsman control plane:
//!
//! - [`ProxyNode`] - parsed data-plane node identity
//! - [`TypeUrl`] - resource type URL constants and helpers
//! - Cluster naming ([`names`]) with deterministic truncation
//! - Response versioning and nonce generation ([`version`])
//! - [`Error`] - the shared error type with gRPC status mapping

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod names;
mod node;
mod type_url;
pub mod version;

pub use error::{Error, Result};
pub use node::{NodeType, ProxyNode};
pub use type_url::TypeUrl;
