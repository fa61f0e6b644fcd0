//! Picweave Embedding Layer
//!
//! This crate turns sentences into dense vectors. It sits in front of
//! whatever embedding backend you have and gives the rest of the pipeline a
//! single interface plus a cache so repeated sentences never hit the network
//! twice.
//!
//! Two modes:
//!
//! - **API mode** - Call out to a remote endpoint. HuggingFace, OpenAI, and a
//!   generic JSON shape are understood out of the box.
//! - **Stub mode** - For testing. Generates fake but consistent vectors.
//!
//! Vectors from different models come out at different widths, so this crate
//! also owns width normalization: every vector gets zero-padded to one
//! standard width before it reaches the index, and the original width is kept
//! so the exact vector can be recovered later.
//!
//! ## Quick example
//!
//! ```
//! use embedding::{embed_texts_cached, EmbeddingCache, EmbeddingConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cfg = EmbeddingConfig::default();
//!     let provider = cfg.build_provider().unwrap();
//!     let cache = EmbeddingCache::new(Duration::from_secs(60), 1024);
//!
//!     let (results, cache_hits) = embed_texts_cached(&provider, &cache, &["hello".to_string()]).await;
//!     assert!(results[0].is_ok());
//!     assert_eq!(cache_hits, 0);
//! }
//! ```

pub mod config;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod types;

mod api;
mod cache;
mod serde_millis;
mod stub;

pub use crate::api::ApiProvider;
pub use crate::cache::{embed_texts_cached, EmbeddingCache};
pub use crate::config::EmbeddingConfig;
pub use crate::error::EmbeddingError;
pub use crate::normalize::{
    infer_original_dim, l2_normalize_in_place, pad_to_standard, recover_original,
    DEFAULT_STANDARD_WIDTH,
};
pub use crate::provider::EmbeddingProvider;
pub use crate::retry::RetryConfig;
pub use crate::stub::StubProvider;
pub use crate::types::TextEmbedding;
