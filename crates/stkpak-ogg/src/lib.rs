//! Ogg container repair.
//!
//! Audio extracted from packages is sometimes damaged at the front: the
//! capture pattern of the first page is missing, junk precedes it, or the
//! header is mangled beyond patching. This crate classifies a buffer with
//! [`analyze`] and fixes what it can with [`repair`]:
//!
//! - A valid first page is left alone, even if its checksum is stale
//!   (use [`refresh_checksum`] for that)
//! - A first page that only lost its position is restored losslessly
//! - Anything worse gets a fresh first-page header built from a template and
//!   spliced in front of the `vorbis` identifier, with a recomputed checksum
//!
//! Buffers that cannot be repaired are returned unchanged.
//!
//! # Example
//!
//! ```
//! use stkpak_ogg::{analyze, repair, ContainerStatus};
//!
//! let data = b"no container here";
//! assert_eq!(analyze(data).status, ContainerStatus::NoMarkerFound);
//! assert_eq!(repair(data), data);
//! ```

mod analysis;
mod repair;

pub mod page;

pub use analysis::{analyze, ContainerAnalysis, ContainerStatus, HEADLESS_WINDOW};
pub use page::{first_page_checksum_ok, PageHeader};
pub use repair::{
    is_ogg_name, is_valid, reconstruct, refresh_checksum, repair, repair_with_outcome,
    RepairAction, RepairOutcome, TEMPLATE_SIZE,
};
