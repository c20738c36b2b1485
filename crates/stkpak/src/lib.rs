//! Stkpak - GPK package extraction and Ogg stream repair.
//!
//! This crate provides a unified interface to the stkpak crates.
//!
//! # Crates
//!
//! - [`stkpak_common`] - Common utilities (binary reading, Ogg CRC-32, anchor scans)
//! - [`stkpak_gpk`] - GPK package reading, extraction and writing
//! - [`stkpak_ogg`] - Ogg container analysis and repair
//!
//! # Example
//!
//! ```no_run
//! use stkpak::prelude::*;
//!
//! let archive = Archive::load("packs/BGM.GPK")?;
//!
//! if let Some(entry) = archive.find("bgm/title_loop.ogg") {
//!     let data = archive.read(entry)?;
//!     let outcome = repair_with_outcome(&data);
//!     println!("{}: {:?}", entry.name(), outcome.action);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use stkpak_common as common;
pub use stkpak_gpk as gpk;
pub use stkpak_ogg as ogg;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use stkpak_common::{crc, BinaryReader};
    pub use stkpak_gpk::{
        extract, extract_all, Archive, ArchiveBuilder, AssetReader, AssetResolver, BulkExtractor,
        Entry, ExtractAllError, ExtractError, LoadError,
    };
    pub use stkpak_ogg::{
        analyze, is_ogg_name, refresh_checksum, repair, repair_with_outcome, ContainerAnalysis,
        ContainerStatus, RepairAction, RepairOutcome,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
