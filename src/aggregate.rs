//! Derived-edge maintenance.
//!
//! `HAS_ORDERED` (user → item, `times` = summed quantity) and
//! `ORDERED_ALONG_WITH` (item ↔ item, `times` = orders containing both) are
//! owned by this module and nothing else writes them. They are either rebuilt
//! from the raw order facts or bumped for one freshly recorded order.
//!
//! Each order whose contribution is reflected in the derived edges carries a
//! processed marker. A rebuild resets the markers to "every order with line
//! items"; an incremental update refuses to apply an order twice.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result, StoreResult};
use crate::store::{tx_count, tx_query_as, FromRow, GraphStore, Params, Row, Transaction};

const CLEAR_HAS_ORDERED: &str = "DELETE FROM has_ordered";
const CLEAR_ORDERED_ALONG_WITH: &str = "DELETE FROM ordered_along_with";
const CLEAR_PROCESSED: &str = "DELETE FROM processed_orders";

const BUILD_HAS_ORDERED: &str = "
    INSERT INTO has_ordered (user_id, item_id, times)
    SELECT hm.user_id, hi.item_id, SUM(hi.quantity)
    FROM has_made hm
    JOIN has_item hi ON hi.order_id = hm.order_id
    GROUP BY hm.user_id, hi.item_id";

// One canonical row per unordered pair (first < second), counted once per order.
const BUILD_CANONICAL_PAIRS: &str = "
    INSERT INTO ordered_along_with (from_item, to_item, times)
    SELECT a.item_id, b.item_id, COUNT(DISTINCT a.order_id)
    FROM has_item a
    JOIN has_item b ON b.order_id = a.order_id AND a.item_id < b.item_id
    GROUP BY a.item_id, b.item_id";

const MIRROR_PAIRS: &str = "
    INSERT INTO ordered_along_with (from_item, to_item, times)
    SELECT to_item, from_item, times
    FROM ordered_along_with
    WHERE from_item < to_item";

const MARK_ALL_PROCESSED: &str = "
    INSERT INTO processed_orders (order_id)
    SELECT DISTINCT order_id FROM has_item";

const ORDER_PROCESSED: &str =
    "SELECT COUNT(*) AS count FROM processed_orders WHERE order_id = :order_id";

const ORDER_EXISTS: &str = "SELECT COUNT(*) AS count FROM orders WHERE id = :order_id";

const ORDER_LINES: &str = "
    SELECT hi.item_id AS item_id, hi.quantity AS quantity, hm.user_id AS user_id
    FROM has_item hi
    LEFT JOIN has_made hm ON hm.order_id = hi.order_id
    WHERE hi.order_id = :order_id
    ORDER BY hi.item_id";

const BUMP_HAS_ORDERED: &str = "
    INSERT INTO has_ordered (user_id, item_id, times)
    VALUES (:user_id, :item_id, :quantity)
    ON CONFLICT (user_id, item_id) DO UPDATE SET times = times + excluded.times";

const BUMP_PAIR: &str = "
    INSERT INTO ordered_along_with (from_item, to_item, times)
    VALUES (:first, :second, 1), (:second, :first, 1)
    ON CONFLICT (from_item, to_item) DO UPDATE SET times = times + 1";

const MARK_PROCESSED: &str = "INSERT INTO processed_orders (order_id) VALUES (:order_id)";

/// Edge counts written by [`rebuild_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    /// `HAS_ORDERED` edges written.
    pub has_ordered: u64,
    /// Unordered co-occurring item pairs; twice as many directed edges exist.
    pub co_occurring_pairs: u64,
    /// Orders marked as reflected in the derived edges.
    pub orders_processed: u64,
}

/// Result of [`apply_new_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The order's lines were folded into the derived edges.
    Applied {
        /// Line items (HAS_ITEM edges) in the order.
        items: usize,
        /// Unordered item pairs bumped in both directions.
        pairs: usize,
    },
    /// The order was already reflected; nothing was written.
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy)]
struct OrderLine {
    item_id: i64,
    quantity: i64,
    user_id: Option<i64>,
}

impl FromRow for OrderLine {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(OrderLine {
            item_id: row.int("item_id")?,
            quantity: row.int("quantity")?,
            user_id: row.opt_int("user_id")?,
        })
    }
}

/// Recomputes every derived edge from the raw facts in one transaction.
///
/// The outcome depends only on the current users, orders and line items, so
/// the rebuild can be re-run at any time; a failure leaves the previous
/// derived state untouched.
pub fn rebuild_all(store: &dyn GraphStore) -> Result<RebuildSummary> {
    let mut summary = RebuildSummary::default();
    store.write_transaction(&mut |tx: &mut dyn Transaction| {
        let none = Params::new();
        tx.execute(CLEAR_HAS_ORDERED, &none)?;
        tx.execute(CLEAR_ORDERED_ALONG_WITH, &none)?;
        tx.execute(CLEAR_PROCESSED, &none)?;
        summary.has_ordered = tx.execute(BUILD_HAS_ORDERED, &none)?;
        summary.co_occurring_pairs = tx.execute(BUILD_CANONICAL_PAIRS, &none)?;
        tx.execute(MIRROR_PAIRS, &none)?;
        summary.orders_processed = tx.execute(MARK_ALL_PROCESSED, &none)?;
        Ok(())
    })?;
    info!(
        has_ordered = summary.has_ordered,
        co_occurring_pairs = summary.co_occurring_pairs,
        orders_processed = summary.orders_processed,
        "rebuilt derived edges"
    );
    Ok(summary)
}

/// Folds one recorded order into the derived edges.
///
/// The order and its line items must already be in the graph. Every write for
/// the order happens in one transaction. Calling this again for an order that
/// was already applied (or covered by a rebuild) is a no-op.
pub fn apply_new_order(store: &dyn GraphStore, order_id: i64) -> Result<ApplyOutcome> {
    let mut outcome = None;
    store.write_transaction(&mut |tx: &mut dyn Transaction| {
        outcome = apply_in_tx(tx, order_id)?;
        Ok(())
    })?;
    match outcome {
        Some(outcome) => {
            debug!(order_id, ?outcome, "applied order to derived edges");
            Ok(outcome)
        }
        None => Err(Error::UnknownOrder(order_id)),
    }
}

fn apply_in_tx(tx: &mut dyn Transaction, order_id: i64) -> StoreResult<Option<ApplyOutcome>> {
    let order = Params::new().with("order_id", order_id);
    if tx_count(tx, ORDER_EXISTS, &order)? == 0 {
        return Ok(None);
    }
    if tx_count(tx, ORDER_PROCESSED, &order)? > 0 {
        return Ok(Some(ApplyOutcome::AlreadyApplied));
    }

    let lines: Vec<OrderLine> = tx_query_as(tx, ORDER_LINES, &order)?;
    for line in &lines {
        let Some(user_id) = line.user_id else {
            continue;
        };
        let params = Params::new()
            .with("user_id", user_id)
            .with("item_id", line.item_id)
            .with("quantity", line.quantity);
        tx.execute(BUMP_HAS_ORDERED, &params)?;
    }

    let pairs = canonical_pairs(&lines);
    for &(first, second) in &pairs {
        let params = Params::new().with("first", first).with("second", second);
        tx.execute(BUMP_PAIR, &params)?;
    }

    if !lines.is_empty() {
        tx.execute(MARK_PROCESSED, &order)?;
    }
    Ok(Some(ApplyOutcome::Applied {
        items: lines.len(),
        pairs: pairs.len(),
    }))
}

/// Unordered pairs of distinct items, each once, as `(low, high)`.
fn canonical_pairs(lines: &[OrderLine]) -> Vec<(i64, i64)> {
    let mut ids: Vec<i64> = lines.iter().map(|line| line.item_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let mut pairs = Vec::with_capacity(ids.len() * ids.len().saturating_sub(1) / 2);
    for (idx, &first) in ids.iter().enumerate() {
        for &second in &ids[idx + 1..] {
            pairs.push((first, second));
        }
    }
    pairs
}
