//! LIS HTTP - REST client for the storage backend
//!
//! Implements [`lis_engine::StorageApi`] over `reqwest`:
//! - Endpoint paths from [`lis_engine::api::paths`] under the configured prefix
//! - HTTP status mapped onto [`lis_engine::ApiError`]
//! - A `409` from `can-delete` folded into a constrained answer
//!
//! # Example
//!
//! ```rust,no_run
//! use lis_engine::{EngineConfig, StorageApi};
//! use lis_http::HttpStorageApi;
//! use lis_model::{LocationType, NodeId};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = HttpStorageApi::new(EngineConfig::new().with_base_url("https://lis.example.org"))?;
//! let answer = api.can_delete(LocationType::Shelf, &NodeId::from(20u64)).await?;
//! println!("deletable: {}", !answer.is_blocked(LocationType::Shelf));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;

pub use client::HttpStorageApi;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
