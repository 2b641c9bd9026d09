//! # Cinder Core
//!
//! Core traits and types for the Cinder compression library.
//!
//! ## Core Traits
//!
//! - [`Compressor`] - One-shot compression operations
//! - [`Decompressor`] - One-shot decompression operations
//! - [`Codec`] - Combined compress/decompress capability
//!
//! ## Example
//!
//! ```ignore
//! use cinder_core::{Codec, CompressionLevel};
//! use cinder_brotli::BrotliCodec;
//!
//! let codec = BrotliCodec::with_level(CompressionLevel::Default);
//! let compressed = codec.compress(data)?;
//! let original = codec.decompress(&compressed)?;
//! ```

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{Codec, Compressor, Decompressor};
pub use types::{Algorithm, CompressionLevel, CompressionRatio};
