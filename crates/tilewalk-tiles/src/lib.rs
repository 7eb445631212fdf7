//! Tile variants and the executor that runs them.
//!
//! A tile definition declares its type as a string; the executor resolves it
//! to a [`TileKind`](tilewalk_core::TileKind), configures the matching
//! [`Tile`] variant from the definition's configuration map, runs it, and
//! merges the result into the workflow data.

pub mod builtin;
pub mod condition;
pub mod executor;
pub mod http;

pub use builtin::{ConfigReport, Tile, TileContext, TileOutput};
pub use executor::{TileExecutor, TileRun};
pub use http::ReqwestHttpClient;
