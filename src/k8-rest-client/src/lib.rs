//!
//! # Kubernetes REST client
//!
//! Fluent requests against the Kubernetes API surface, a durable watch
//! engine and an exec channel over a SPDY upgrade.  The HTTP client, TLS
//! stack, credentials and SPDY framing are external collaborators behind
//! the [`Transport`], [`CredentialProvider`] and
//! [`exec::StreamMultiplexer`] boundaries.
//!
mod client;
mod config;
mod credentials;
mod error;
mod execute;
mod replace;
mod request;
mod response;
mod transport;

pub mod exec;
pub mod watch;

pub use self::client::{new_shared, K8Client, SharedK8Client, VersionInfo};
pub use self::config::ClusterConfig;
pub use self::credentials::{Anonymous, BearerToken, CredentialProvider};
pub use self::error::{ClientError, StatusError};
pub use self::request::{BodyStream, K8Request, MultiMap, RequestBody};
pub use self::response::K8Response;
pub use self::transport::{AsyncStream, CompletionMode, HyperTransport, Transport, UpgradedIo};

pub mod metadata {
    pub use k8_rest_types::*;
}
