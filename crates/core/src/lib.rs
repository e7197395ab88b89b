//! vcp-core: Core library for the vcp blob copier
//!
//! This crate provides the vendor-neutral parts of vcp:
//! - The virtual tree of containers and blobs
//! - Virtual address parsing
//! - Mapping flat key listings into the tree and back
//! - The chunked download/upload engine with its cache strategies
//! - The CloudBackend trait plus an in-memory implementation
//!
//! Backend clients are constructed by the caller and passed in; nothing here
//! reads configuration files or the environment.

pub mod address;
pub mod cache;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod resume;
pub mod retry;
pub mod traits;
pub mod transfer;
pub mod tree;

pub use address::{AccountAddress, ResolveMode, VirtualAddress};
pub use cache::CacheStrategy;
pub use error::{Error, Result};
pub use mapper::{BackendAddress, NamespaceMapper};
pub use memory::MemoryBackend;
pub use retry::{RetryPolicy, Retrying};
pub use traits::{BoxedReader, CloudBackend, ObjectEntry};
pub use transfer::{copy_blob, TransferConfig, TransferEngine, UploadSummary};
pub use tree::{BlobId, CachedContent, ContainerId, NodeRef, Origin, VirtualTree};
