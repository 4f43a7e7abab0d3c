//! Domain records shared by the strategies, the hybrid combiner and the
//! transports.
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::store::{FromRow, Row};

/// Restaurant customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// Unique user id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Account creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow for User {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(User {
            id: row.int("user_id")?,
            name: row.text("name")?.to_owned(),
            email: row.text("email")?.to_owned(),
            created_at: row.timestamp("created_at")?,
        })
    }
}

/// Menu item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    /// Unique item id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Non-negative unit price.
    pub price: f64,
    /// Menu category.
    pub category: String,
    /// Optional free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Items are always projected as `item_id, name, price, category, description`.
impl FromRow for Item {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(Item {
            id: row.int("item_id")?,
            name: row.text("name")?.to_owned(),
            price: row.float("price")?,
            category: row.text("category")?.to_owned(),
            description: row.opt_text("description")?.map(str::to_owned),
        })
    }
}

/// One of the four scoring strategies, in the fixed inspection order used to
/// break ties when picking a hybrid result's dominant strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strategy {
    /// Items the user orders most.
    UserFrequency,
    /// Items the user ordered together with the item in cart.
    UserCoOrders,
    /// Items everyone ordered together with the item in cart.
    GlobalCoOrders,
    /// Items appearing in recent orders.
    TimeBasedTrend,
}

impl Strategy {
    /// All strategies in inspection order.
    pub const ALL: [Strategy; 4] = [
        Strategy::UserFrequency,
        Strategy::UserCoOrders,
        Strategy::GlobalCoOrders,
        Strategy::TimeBasedTrend,
    ];

    /// Stable name used in responses and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::UserFrequency => "UserFrequency",
            Strategy::UserCoOrders => "UserCoOrders",
            Strategy::GlobalCoOrders => "GlobalCoOrders",
            Strategy::TimeBasedTrend => "TimeBasedTrend",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored, explained item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// The recommended item.
    pub item: Item,
    /// Strategy score, or the weighted total for hybrid results.
    pub score: f64,
    /// Human readable reason.
    pub explanation: String,
    /// Producing strategy, or the dominant one for hybrid results.
    pub strategy: Strategy,
}

/// Per-strategy multipliers for the hybrid combiner. Values are expected to be
/// non-negative; totals are not normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    /// Weight of [`Strategy::UserFrequency`].
    pub user_frequency: f64,
    /// Weight of [`Strategy::UserCoOrders`].
    pub user_co_orders: f64,
    /// Weight of [`Strategy::GlobalCoOrders`].
    pub global_co_orders: f64,
    /// Weight of [`Strategy::TimeBasedTrend`].
    pub time_based_trend: f64,
}

impl HybridWeights {
    /// Weight applied to `strategy`.
    pub fn weight(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::UserFrequency => self.user_frequency,
            Strategy::UserCoOrders => self.user_co_orders,
            Strategy::GlobalCoOrders => self.global_co_orders,
            Strategy::TimeBasedTrend => self.time_based_trend,
        }
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        crate::classifier::DEFAULT_WEIGHTS
    }
}
