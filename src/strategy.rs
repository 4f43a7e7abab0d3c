//! The four scoring strategies. Each is a single read against the graph store
//! with its own typed result record; none of them holds state.

use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::error::{Result, StoreResult};
use crate::model::{Item, Recommendation, Strategy};
use crate::store::{query_as, FromRow, GraphStore, Params, Row};

macro_rules! item_columns {
    () => {
        "i.id AS item_id, i.name AS name, i.price AS price, i.category AS category, \
         i.description AS description"
    };
}

const USER_FREQUENCY: &str = concat!(
    "SELECT ",
    item_columns!(),
    ", ho.times AS times
    FROM has_ordered ho
    JOIN items i ON i.id = ho.item_id
    WHERE ho.user_id = :user_id
    ORDER BY ho.times DESC, i.id"
);

const USER_CO_ORDERS: &str = concat!(
    "SELECT ",
    item_columns!(),
    ", COUNT(DISTINCT hm.order_id) AS co_occurrences
    FROM has_made hm
    JOIN has_item target ON target.order_id = hm.order_id AND target.item_id = :item_id
    JOIN has_item co ON co.order_id = hm.order_id AND co.item_id <> :item_id
    JOIN items i ON i.id = co.item_id
    WHERE hm.user_id = :user_id
    GROUP BY i.id
    ORDER BY co_occurrences DESC, i.id"
);

const GLOBAL_CO_ORDERS: &str = concat!(
    "SELECT ",
    item_columns!(),
    ", oaw.times AS times
    FROM ordered_along_with oaw
    JOIN items i ON i.id = oaw.to_item
    WHERE oaw.from_item = :item_id
    ORDER BY oaw.times DESC, i.id"
);

const TRENDING: &str = concat!(
    "SELECT ",
    item_columns!(),
    ", COUNT(DISTINCT o.id) AS recent_orders
    FROM orders o
    JOIN has_item hi ON hi.order_id = o.id
    JOIN items i ON i.id = hi.item_id
    WHERE o.created_at >= :window_start AND o.created_at <= :now
    GROUP BY i.id
    ORDER BY recent_orders DESC, i.id"
);

struct FrequencyRow {
    item: Item,
    times: i64,
}

impl FromRow for FrequencyRow {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(FrequencyRow {
            item: Item::from_row(row)?,
            times: row.int("times")?,
        })
    }
}

struct UserCoOrderRow {
    item: Item,
    co_occurrences: i64,
}

impl FromRow for UserCoOrderRow {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(UserCoOrderRow {
            item: Item::from_row(row)?,
            co_occurrences: row.int("co_occurrences")?,
        })
    }
}

struct GlobalCoOrderRow {
    item: Item,
    times: i64,
}

impl FromRow for GlobalCoOrderRow {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(GlobalCoOrderRow {
            item: Item::from_row(row)?,
            times: row.int("times")?,
        })
    }
}

struct TrendRow {
    item: Item,
    recent_orders: i64,
}

impl FromRow for TrendRow {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(TrendRow {
            item: Item::from_row(row)?,
            recent_orders: row.int("recent_orders")?,
        })
    }
}

/// Items the user has ordered, scored by total quantity, highest first.
pub fn user_frequent_items(store: &dyn GraphStore, user_id: i64) -> Result<Vec<Recommendation>> {
    let params = Params::new().with("user_id", user_id);
    let rows: Vec<FrequencyRow> = query_as(store, USER_FREQUENCY, &params)?;
    debug!(user_id, results = rows.len(), "user frequency");
    Ok(rows
        .into_iter()
        .map(|row| Recommendation {
            item: row.item,
            score: row.times as f64,
            explanation: format!("You've ordered this {} times", row.times),
            strategy: Strategy::UserFrequency,
        })
        .collect())
}

/// Items that appeared alongside `item_id` in the user's own orders, scored by
/// how many of those orders contained them. `item_id` itself never appears.
pub fn user_co_ordered_items(
    store: &dyn GraphStore,
    user_id: i64,
    item_id: i64,
) -> Result<Vec<Recommendation>> {
    let params = Params::new()
        .with("user_id", user_id)
        .with("item_id", item_id);
    let rows: Vec<UserCoOrderRow> = query_as(store, USER_CO_ORDERS, &params)?;
    debug!(user_id, item_id, results = rows.len(), "user co-orders");
    Ok(rows
        .into_iter()
        .map(|row| Recommendation {
            item: row.item,
            score: row.co_occurrences as f64,
            explanation: format!(
                "You've ordered this {} times with item {item_id}",
                row.co_occurrences
            ),
            strategy: Strategy::UserCoOrders,
        })
        .collect())
}

/// Items co-ordered with `item_id` across all users, read straight from the
/// derived co-occurrence edges.
pub fn global_co_ordered_items(
    store: &dyn GraphStore,
    item_id: i64,
) -> Result<Vec<Recommendation>> {
    let params = Params::new().with("item_id", item_id);
    let rows: Vec<GlobalCoOrderRow> = query_as(store, GLOBAL_CO_ORDERS, &params)?;
    debug!(item_id, results = rows.len(), "global co-orders");
    Ok(rows
        .into_iter()
        .map(|row| Recommendation {
            item: row.item,
            score: row.times as f64,
            explanation: format!(
                "Customers who ordered item {item_id} also ordered this {} times",
                row.times
            ),
            strategy: Strategy::GlobalCoOrders,
        })
        .collect())
}

/// Items in orders placed within `window`, scored by the number of those
/// orders containing them.
pub fn trending_items(
    store: &dyn GraphStore,
    window: TrendWindow,
    now: OffsetDateTime,
) -> Result<Vec<Recommendation>> {
    let params = Params::new()
        .with("window_start", window.start(now))
        .with("now", now);
    let rows: Vec<TrendRow> = query_as(store, TRENDING, &params)?;
    let days = window.days();
    debug!(days, results = rows.len(), "time-based trend");
    Ok(rows
        .into_iter()
        .map(|row| Recommendation {
            item: row.item,
            score: row.recent_orders as f64,
            explanation: format!(
                "Ordered {} times in the last {days} days",
                row.recent_orders
            ),
            strategy: Strategy::TimeBasedTrend,
        })
        .collect())
}

/// Look-back window for [`trending_items`], in whole days.
///
/// An order qualifies when its calendar date (UTC) is later than
/// `today - days` and it was not created after `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
    days: u32,
}

impl TrendWindow {
    /// Window used when none or an invalid one is given.
    pub const DEFAULT_DAYS: u32 = 7;

    /// Normalizes a requested day count; non-positive values fall back to the
    /// default.
    pub fn new(days: i64) -> Self {
        match u32::try_from(days) {
            Ok(days) if days > 0 => TrendWindow { days },
            Ok(_) => TrendWindow::default(),
            Err(_) if days > 0 => TrendWindow { days: u32::MAX },
            Err(_) => TrendWindow::default(),
        }
    }

    /// Parses a raw transport parameter; missing or unparsable input falls
    /// back to the default.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .map_or_else(TrendWindow::default, TrendWindow::new)
    }

    /// Window length in days.
    pub fn days(self) -> u32 {
        self.days
    }

    /// First instant that falls inside the window.
    pub fn start(self, now: OffsetDateTime) -> OffsetDateTime {
        let today = now.to_offset(UtcOffset::UTC).date();
        let first_day = today
            .checked_sub(Duration::days(i64::from(self.days) - 1))
            .unwrap_or(time::Date::MIN);
        first_day.midnight().assume_utc()
    }
}

impl Default for TrendWindow {
    fn default() -> Self {
        TrendWindow {
            days: Self::DEFAULT_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn invalid_windows_fall_back_to_a_week() {
        assert_eq!(TrendWindow::new(0).days(), 7);
        assert_eq!(TrendWindow::new(-3).days(), 7);
        assert_eq!(TrendWindow::parse(Some("abc")).days(), 7);
        assert_eq!(TrendWindow::parse(None).days(), 7);
        assert_eq!(TrendWindow::parse(Some(" 30 ")).days(), 30);
    }

    #[test]
    fn window_starts_at_midnight_days_minus_one_back() {
        let now = datetime!(2024-05-10 18:45:00 UTC);
        assert_eq!(
            TrendWindow::new(7).start(now),
            datetime!(2024-05-04 00:00:00 UTC)
        );
        assert_eq!(
            TrendWindow::new(1).start(now),
            datetime!(2024-05-10 00:00:00 UTC)
        );
    }

    #[test]
    fn window_never_reaches_further_back_than_its_length() {
        let now = datetime!(2024-05-10 00:00:01 UTC);
        let start = TrendWindow::new(7).start(now);
        assert!(now - start <= Duration::days(7));
    }

    #[test]
    fn window_uses_the_utc_calendar_date() {
        let now = datetime!(2024-05-10 01:00:00 +03:00);
        assert_eq!(
            TrendWindow::new(1).start(now),
            datetime!(2024-05-09 00:00:00 UTC)
        );
    }

    #[test]
    fn huge_windows_saturate() {
        let now = datetime!(2024-05-10 00:00:00 UTC);
        assert_eq!(
            TrendWindow::new(i64::MAX).start(now),
            time::Date::MIN.midnight().assume_utc()
        );
    }
}
