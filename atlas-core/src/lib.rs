//! Secure on-device persistence for clinical before/after photographs.
//!
//! Layers, leaf first:
//!
//! - [`secret`]: durable storage for the single symmetric key
//! - [`cipher`]: authenticated encryption with that key
//! - [`blob_store`]: encrypted files with atomic replacement
//! - [`snapshot`]: one typed value persisted as one blob
//! - [`repository`]: the clinical aggregate kept in sync with its snapshot
//!
//! Nothing below the repository knows about patients or cases.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod blob_store;
pub mod cipher;
pub mod logger;
pub mod model;
pub mod paths;
pub mod repository;
pub mod secret;
pub mod snapshot;

mod collaborators;
pub use collaborators::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

pub use blob_store::EncryptedBlobStore;
pub use cipher::CipherEngine;
pub use model::*;
pub use repository::{PhotoReader, Repository};
pub use snapshot::SnapshotStore;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("atlas_core");
