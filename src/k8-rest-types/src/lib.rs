//!
//! # Kubernetes wire types
//!
//! Object metadata, status payloads, watch events and the resource type
//! scheme shared by the `k8-rest-client` crate.
//!
mod codec;
mod metadata;
mod status;
mod watch;

pub mod core;
pub mod scheme;

pub use self::codec::clone_via_json;
pub use self::metadata::*;
pub use self::scheme::*;
pub use self::status::*;
pub use self::watch::*;

pub const DEFAULT_NS: &str = "default";
