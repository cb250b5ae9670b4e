//! Layup - Daemonless Container Image Builder Library
//!
//! Layup takes an existing base image from a registry, adds one layer built
//! from local files, replaces the environment and start command, and pushes
//! the result to a registry. No container engine is involved: images are
//! composed from their manifest, config and layer blobs directly.
//!
//! # Quick Start
//!
//! ```no_run
//! use liblayup::auth::DockerKeychain;
//! use liblayup::transport::HttpTransport;
//! use liblayup::{BuildRequest, Pipeline, Registry, Silent};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new(
//!         Arc::new(HttpTransport::new()?),
//!         Arc::new(DockerKeychain::from_env()),
//!     );
//!
//!     let request = BuildRequest::from_cli(
//!         "alpine:3.20",
//!         "localhost:5000/team/app:v1",
//!         vec!["./app".into()],
//!         &["PORT=8080"],
//!         "/app --serve",
//!     )?;
//!
//!     let report = Pipeline::new(&registry, &Silent).run(&request)?;
//!     println!("pushed {:?}", report.digest);
//!     Ok(())
//! }
//! ```
//!
//! # Main Types
//!
//! - [`Pipeline`] - Runs one build: fetch, compose, push
//! - [`Registry`] - Fetches and pushes images, mounting blobs where possible
//! - [`Image`] - Immutable image value (manifest, config, layers)
//! - [`Reference`] - Image reference parsing
//! - [`Digest`] - Content digest validation and handling
//!
//! # Architecture
//!
//! Bottom-up: [`archive`] writes deterministic tars, [`layer`] turns them
//! into content-addressed layers, [`mutate`] derives new images from old
//! ones, [`client`] speaks the distribution API over a [`transport`], and
//! [`registry`] and [`pipeline`] sequence it all.

#![warn(clippy::all)]

/// Returns the liblayup crate version.
///
/// # Examples
///
/// ```
/// let version = liblayup::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use auth::{CredentialResolver, Credentials};
pub use config::Config;
pub use digest::Digest;
pub use error::{LayupError, Result};
pub use image::Image;
pub use mutate::ConfigOverrides;
pub use pipeline::{BuildRequest, Event, Observer, Pipeline, Silent, Stage};
pub use reference::{Reference, Repository};
pub use registry::{PushReport, Registry};

pub mod archive;
pub mod auth;
pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod layer;
pub mod mutate;
pub mod oci;
pub mod pipeline;
pub mod reference;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
