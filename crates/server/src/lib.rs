//! Picweave Server - HTTP REST API for sentence-to-image matching
//!
//! This crate exposes the picweave matching pipeline over a REST API:
//!
//! - **Batch Matching**: Submit a batch of sentences, get ranked candidates
//!   per sentence plus a duplicate-free allocation with quality metrics
//! - **Library Management**: Insert images (descriptions are embedded
//!   server-side), query stats, delete images
//! - **Health & Metrics**: Liveness/readiness probes and Prometheus metrics
//!
//! # Features
//!
//! - **Authentication**: API key-based authentication with rate limiting
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Graceful Shutdown**: Proper signal handling for production deployments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints (No Authentication)
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Protected Endpoints (API Key Required)
//!
//! - `POST /api/v1/similarity/batch` - Match a batch of sentences
//! - `POST /api/v1/library/images` - Insert images (single or batch)
//! - `GET /api/v1/library/stats` - Library statistics
//! - `DELETE /api/v1/library/images/{id}` - Delete image
//! - `GET /api/v1/metadata` - Server metadata

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::start_server;
pub use state::ServerState;
