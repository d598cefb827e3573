//! # Versioned content store
//!
//! Core, transport-agnostic implementation of a zero-knowledge,
//! Time-Machine-style versioned backup client: the incremental scanner, the
//! local catalog's point-in-time query algebra, the encrypted shard packer,
//! the backup driver's session orchestration, and the point-in-time restore
//! planner with its catalog-recovery companion.
//!
//! ## Layers
//! 1. `model`    – pure data structures (FileVersion, ChangeRecord, …).
//! 2. `crypto`   – key derivation, hashing, seal/open (C1).
//! 3. `catalog`  – the `CatalogStore` storage contract and query algebra (C2).
//! 4. `scanner`  – incremental directory walk (C3).
//! 5. `packer`   – shard packing + `Uploader` trait (C4).
//! 6. `driver`   – session orchestration (C5).
//! 7. `restore`  – point-in-time restore + `Downloader` trait (C6).
//! 8. `recovery` – catalog-snapshot recovery (C7).
//!
//! Storage and transport are external collaborators reached only through
//! the `CatalogStore`, `Uploader`, and `Downloader` traits; concrete
//! implementations live in sibling crates (`cvault_catalog_redb`,
//! `cvault_transport_http`).

pub mod catalog;
pub mod config;
pub mod crypto;
pub mod driver;
pub mod error;
pub mod model;
pub mod packer;
pub mod progress;
pub mod recovery;
pub mod restore;
pub mod scanner;
pub mod session;
pub mod singleton;

pub use catalog::CatalogStore;
pub use config::VaultConfig;
pub use crypto::{KeyDerivation, VaultKey};
pub use driver::{BackupDriver, SessionOutcome};
pub use error::{CoreError, CoreResult};
pub use model::{ChangeRecord, FileVersion};
pub use packer::Uploader;
pub use restore::{Downloader, RestoreTarget};
pub use session::SessionId;
