//! Common utilities for stkpak.
//!
//! This crate provides the foundational pieces shared by the package reader
//! and the Ogg repair engine:
//!
//! - [`BinaryReader`] - Zero-copy little-endian reading from byte slices
//! - [`crc`] - The Ogg flavour of CRC-32 (polynomial `0x04C11DB7`, MSB first)
//! - [`scan`] - Bounded "find the next plausible anchor" searches

mod error;
mod reader;

pub mod crc;
pub mod scan;

pub use error::{Error, Result};
pub use reader::BinaryReader;
