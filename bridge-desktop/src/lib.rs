//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry and exponential backoff
//! - `WatchPositionStore` and `WatchHistoryStore` using a SQLite database
//!
//! The media engine and the now-playing presenter are platform-owned and have
//! no desktop default here.
//!
//! ## Feature Flags
//!
//! - `sqlite-store`: Enable the SQLite-backed watch store (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteWatchStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let store = SqliteWatchStore::new("watch.db".into()).await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod http;

#[cfg(feature = "sqlite-store")]
mod watch_store;

pub use http::ReqwestHttpClient;

#[cfg(feature = "sqlite-store")]
pub use watch_store::SqliteWatchStore;
