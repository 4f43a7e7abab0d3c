//! Menu recommendations over a property graph of users, orders and items.
//!
//! Raw facts (who placed which order, which items each order held) are loaded
//! by [`import`]. [`aggregate`] maintains the derived `HAS_ORDERED` and
//! `ORDERED_ALONG_WITH` edges, four [`strategy`] functions score items from
//! them, and [`hybrid`] blends the strategies with per-user weights chosen by
//! [`classifier`]. [`service::RecommendationService`] bundles everything for
//! the HTTP [`server`] and the `menugraph` binary.

#![warn(missing_docs)]

pub mod aggregate;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod import;
pub mod logging;
pub mod model;
pub mod server;
pub mod service;
pub mod store;
pub mod strategy;

pub use aggregate::{apply_new_order, rebuild_all, ApplyOutcome, RebuildSummary};
pub use error::{Error, Result, StoreError, StoreResult};
pub use model::{HybridWeights, Item, Recommendation, Strategy, User};
pub use service::{Clock, FixedClock, RecommendationService, SystemClock};
pub use store::{GraphStore, SqliteGraphStore};
