//! # Picweave Index
//!
//! Backend-agnostic storage and search for illustration image records. Each
//! record carries the embedding of an image's description (padded to one
//! standard width), the identity of the model that produced it, and the
//! metadata needed to filter searches by image set or provider.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: Storage goes through the [`IndexBackend`] trait.
//!   An in-memory `HashMap` backend ships out of the box.
//! - **Compact Storage**: Records are bincode-encoded and Zstd-compressed
//!   before hitting the backend.
//! - **Filtered Similarity Search**: Cosine similarity over padded vectors,
//!   with metadata filters for provider, model, native width, and image set,
//!   plus explicit exclusion of already-used images.
//!
//! ## Example Usage
//!
//! ```
//! use index::{ImageIndex, IndexConfig, BackendConfig, ImageRecord, SearchParams};
//!
//! let config = IndexConfig::new().with_backend(BackendConfig::in_memory());
//! let idx = ImageIndex::new(config).unwrap();
//!
//! let record = ImageRecord::new(1, "nature", "a mountain lake at dawn", vec![1.0, 0.0], 2)
//!     .with_model("stub", "stub-model");
//! idx.upsert(&record).unwrap();
//!
//! let params = SearchParams::new(5);
//! let hits = idx.search(&[1.0, 0.0], &params).unwrap();
//! assert_eq!(hits[0].image_id, 1);
//! ```

mod backend;
mod query;

pub use backend::{BackendConfig, InMemoryBackend, IndexBackend};
pub use query::{Candidate, SearchParams};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;
use zstd::{decode_all, encode_all};

/// Bump this value whenever the stored `ImageRecord` layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

/// Which modality the stored vector was embedded from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingType {
    /// Embedding of the image's text description.
    Text,
    /// Embedding of the image pixels themselves.
    Image,
}

/// A single indexed image.
///
/// The vector is stored padded to the index's standard width;
/// `original_dim` records the width the model actually produced.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ImageRecord {
    /// Schema version for backward compatibility when deserializing.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    /// Numeric id of the image, unique across the index.
    pub image_id: i64,
    /// Image set (collection) this image belongs to.
    pub set_name: String,
    /// Human-written description of the image.
    pub description: String,
    /// File format of the source image, e.g. `"jpg"`.
    pub file_format: String,
    /// Provider that produced the embedding.
    pub provider: String,
    /// Model that produced the embedding.
    pub model: String,
    /// Modality of the embedding.
    pub embedding_type: EmbeddingType,
    /// Width of the vector before padding.
    pub original_dim: usize,
    /// The embedding, padded to the standard width.
    pub vector: Vec<f32>,
}

const fn default_schema_version() -> u16 {
    INDEX_SCHEMA_VERSION
}

impl ImageRecord {
    pub fn new(
        image_id: i64,
        set_name: impl Into<String>,
        description: impl Into<String>,
        vector: Vec<f32>,
        original_dim: usize,
    ) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            image_id,
            set_name: set_name.into(),
            description: description.into(),
            file_format: "jpg".into(),
            provider: String::new(),
            model: String::new(),
            embedding_type: EmbeddingType::Text,
            original_dim,
            vector,
        }
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }

    pub fn with_file_format(mut self, file_format: impl Into<String>) -> Self {
        self.file_format = file_format.into();
        self
    }

    pub fn with_embedding_type(mut self, embedding_type: EmbeddingType) -> Self {
        self.embedding_type = embedding_type;
        self
    }
}

/// Compression codec options for index storage.
#[derive(Clone, Debug, Default)]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    /// The compression codec to use.
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for initializing the index.
#[derive(Clone, Debug, Default)]
pub struct IndexConfig {
    /// Backend storage configuration.
    pub backend: BackendConfig,
    /// Compression settings for stored records.
    pub compression: CompressionConfig,
    /// Width every stored vector is padded to.
    pub standard_width: usize,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_standard_width(mut self, standard_width: usize) -> Self {
        self.standard_width = standard_width;
        self
    }
}

/// Custom error type
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Zstd(String),
    /// Stored and query vectors disagree on padded width. This means records
    /// were indexed under a different standard width and cannot be compared.
    #[error("vector width mismatch: expected {expected}, got {got}")]
    WidthMismatch { expected: usize, got: usize },
    /// A record claims a native dimension wider than the padded width, so it
    /// could never have come through the normalizer.
    #[error("original dimension {original_dim} exceeds standard width {standard_width}")]
    DimensionExceedsWidth {
        original_dim: usize,
        standard_width: usize,
    },
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Zstd(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Aggregate counts over the index, by image set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_images: usize,
    pub by_set: std::collections::BTreeMap<String, usize>,
}

/// The image index.
pub struct ImageIndex {
    /// The backend used for storage, abstracted behind a trait.
    backend: Box<dyn IndexBackend>,
    /// The configuration for the index.
    cfg: IndexConfig,
    /// In-memory vector table so searches avoid a full backend scan.
    vector_table: RwLock<Vec<(i64, Vec<f32>)>>,
}

impl ImageIndex {
    /// Initialize an index using the configured backend.
    pub fn new(cfg: IndexConfig) -> Result<Self, IndexError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(cfg, backend))
    }

    /// Build an index with a custom backend (e.g., in-memory for tests).
    pub fn with_backend(cfg: IndexConfig, backend: Box<dyn IndexBackend>) -> Self {
        Self {
            backend,
            cfg,
            vector_table: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn backend(&self) -> &dyn IndexBackend {
        self.backend.as_ref()
    }

    pub(crate) fn vector_table(&self) -> &RwLock<Vec<(i64, Vec<f32>)>> {
        &self.vector_table
    }

    /// Checks a record against the configured standard width. A width of
    /// zero leaves inserts unvalidated.
    fn check_record(&self, rec: &ImageRecord) -> Result<(), IndexError> {
        if self.cfg.standard_width == 0 {
            return Ok(());
        }
        if rec.vector.len() != self.cfg.standard_width {
            return Err(IndexError::WidthMismatch {
                expected: self.cfg.standard_width,
                got: rec.vector.len(),
            });
        }
        if rec.original_dim > self.cfg.standard_width {
            return Err(IndexError::DimensionExceedsWidth {
                original_dim: rec.original_dim,
                standard_width: self.cfg.standard_width,
            });
        }
        Ok(())
    }

    /// Insert or update a record.
    /// The record is encoded and compressed before being sent to the backend.
    pub fn upsert(&self, rec: &ImageRecord) -> Result<(), IndexError> {
        self.check_record(rec)?;
        let payload = self.encode_record(rec)?;

        {
            let mut table = self
                .vector_table
                .write()
                .map_err(|_| IndexError::backend("poisoned lock"))?;
            if let Some(slot) = table.iter_mut().find(|(id, _)| *id == rec.image_id) {
                slot.1 = rec.vector.clone();
            } else {
                table.push((rec.image_id, rec.vector.clone()));
            }
        }

        self.backend.put(&rec.image_id.to_string(), &payload)
    }

    /// Remove a record from the index.
    pub fn delete(&self, image_id: i64) -> Result<(), IndexError> {
        self.vector_table
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?
            .retain(|(id, _)| *id != image_id);
        self.backend.delete(&image_id.to_string())
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }

    /// Retrieve a record by image id.
    pub fn get(&self, image_id: i64) -> Result<Option<ImageRecord>, IndexError> {
        if let Some(data) = self.backend.get(&image_id.to_string())? {
            let record = self.decode_record(&data)?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Scan all records in the index.
    pub fn scan(
        &self,
        visitor: &mut dyn FnMut(&ImageRecord) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            visitor(&record)
        })
    }

    /// Batch insert multiple records (efficient for large imports).
    pub fn batch_insert(&self, records: &[ImageRecord]) -> Result<(), IndexError> {
        let mut entries = Vec::with_capacity(records.len());
        for rec in records {
            self.check_record(rec)?;
            entries.push((rec.image_id.to_string(), self.encode_record(rec)?));
        }

        {
            let mut table = self
                .vector_table
                .write()
                .map_err(|_| IndexError::backend("poisoned lock"))?;
            table.reserve(records.len());
            for rec in records {
                if let Some(slot) = table.iter_mut().find(|(id, _)| *id == rec.image_id) {
                    slot.1 = rec.vector.clone();
                } else {
                    table.push((rec.image_id, rec.vector.clone()));
                }
            }
        }

        self.backend.batch_put(entries)
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.vector_table.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts per image set, from a full scan.
    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let mut stats = IndexStats::default();
        self.scan(&mut |rec| {
            stats.total_images += 1;
            *stats.by_set.entry(rec.set_name.clone()).or_insert(0) += 1;
            Ok(())
        })?;
        Ok(stats)
    }

    /// Decodes and decompresses a record from the backend.
    pub(crate) fn decode_record(&self, data: &[u8]) -> Result<ImageRecord, IndexError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&decompressed, standard())?;
        Ok(record)
    }

    /// Encodes and compresses a record for storage in the backend.
    fn encode_record(&self, rec: &ImageRecord) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(rec, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}
