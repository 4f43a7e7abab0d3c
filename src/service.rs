//! Facade over the graph store that every transport goes through.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::aggregate::{self, ApplyOutcome, RebuildSummary};
use crate::catalog;
use crate::classifier::{self, DEFAULT_WEIGHTS, EXPERIENCED_USER_WEIGHTS, NEW_USER_WEIGHTS};
use crate::error::Result;
use crate::hybrid;
use crate::import::{self, ImportConfig, ImportError, ImportStatus, ImportSummary, NewOrder};
use crate::model::{HybridWeights, Item, Recommendation, User};
use crate::store::GraphStore;
use crate::strategy::{self, TrendWindow};

/// Source of "now" for the time-based trend.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Recommendation, aggregation and catalog operations over one store.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
}

impl RecommendationService {
    /// Service using the system clock.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Service using `clock` for trend windows.
    pub fn with_clock(store: Arc<dyn GraphStore>, clock: Arc<dyn Clock>) -> Self {
        RecommendationService { store, clock }
    }

    /// Underlying store handle.
    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// See [`strategy::user_frequent_items`].
    pub fn user_frequent_items(&self, user_id: i64) -> Result<Vec<Recommendation>> {
        strategy::user_frequent_items(self.store(), user_id)
    }

    /// See [`strategy::user_co_ordered_items`].
    pub fn user_co_ordered_items(
        &self,
        user_id: i64,
        item_id: i64,
    ) -> Result<Vec<Recommendation>> {
        strategy::user_co_ordered_items(self.store(), user_id, item_id)
    }

    /// See [`strategy::global_co_ordered_items`].
    pub fn global_co_ordered_items(&self, item_id: i64) -> Result<Vec<Recommendation>> {
        strategy::global_co_ordered_items(self.store(), item_id)
    }

    /// Trending items over the last `days` days; non-positive values mean 7.
    pub fn trending_items(&self, days: i64) -> Result<Vec<Recommendation>> {
        strategy::trending_items(self.store(), TrendWindow::new(days), self.clock.now())
    }

    /// Full hybrid ranking, highest first. Never fails; callers truncate.
    pub fn hybrid_recommendation(
        &self,
        user_id: i64,
        item_in_cart: Option<i64>,
        weights: &HybridWeights,
    ) -> Vec<Recommendation> {
        hybrid::hybrid_recommendation(
            self.store(),
            user_id,
            item_in_cart,
            weights,
            self.clock.now(),
        )
    }

    /// Whether the user has fewer than three orders.
    pub fn is_new_user(&self, user_id: i64) -> Result<bool> {
        classifier::is_new_user(self.store(), user_id)
    }

    /// Balanced preset.
    pub fn default_weights(&self) -> HybridWeights {
        DEFAULT_WEIGHTS
    }

    /// Preset for users with little history.
    pub fn weights_for_new_user(&self) -> HybridWeights {
        NEW_USER_WEIGHTS
    }

    /// Preset for regulars.
    pub fn weights_for_experienced_user(&self) -> HybridWeights {
        EXPERIENCED_USER_WEIGHTS
    }

    /// Preset for the user's class, default preset on failure.
    pub fn weights_for_user(&self, user_id: i64) -> HybridWeights {
        classifier::weights_for_user(self.store(), user_id)
    }

    /// Whole menu.
    pub fn all_items(&self) -> Result<Vec<Item>> {
        catalog::all_items(self.store())
    }

    /// Menu items of one category.
    pub fn items_by_category(&self, category: &str) -> Result<Vec<Item>> {
        catalog::items_by_category(self.store(), category)
    }

    /// Every customer.
    pub fn all_users(&self) -> Result<Vec<User>> {
        catalog::all_users(self.store())
    }

    /// Node and derived edge counts.
    pub fn import_status(&self) -> Result<ImportStatus> {
        import::import_status(self.store())
    }

    /// Replaces the graph with the CSV facts under `cfg`.
    pub fn import(&self, cfg: &ImportConfig) -> std::result::Result<ImportSummary, ImportError> {
        import::run_import(self.store(), cfg)
    }

    /// Recomputes every derived edge.
    pub fn rebuild_all(&self) -> Result<RebuildSummary> {
        aggregate::rebuild_all(self.store())
    }

    /// Folds one recorded order into the derived edges.
    pub fn apply_new_order(&self, order_id: i64) -> Result<ApplyOutcome> {
        aggregate::apply_new_order(self.store(), order_id)
    }

    /// Records an order; derived edges are updated separately by
    /// [`apply_new_order`](Self::apply_new_order).
    pub fn record_order(&self, order: &NewOrder) -> std::result::Result<(), ImportError> {
        import::record_order(self.store(), order)
    }
}
