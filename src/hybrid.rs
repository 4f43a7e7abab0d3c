//! Weighted blend of the four strategies.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{HybridWeights, Item, Recommendation, Strategy};
use crate::store::GraphStore;
use crate::strategy::{self, TrendWindow};

/// Trend window the combiner always uses, in days.
pub const HYBRID_TREND_DAYS: i64 = 7;

/// Number of results transports show by default.
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// Blends every applicable strategy into one ranking.
///
/// Co-order strategies only run when `item_in_cart` is given. A strategy that
/// fails is logged and contributes nothing. The item in cart is never part of
/// the result. Results are sorted by total score, highest first; callers
/// truncate.
pub fn hybrid_recommendation(
    store: &dyn GraphStore,
    user_id: i64,
    item_in_cart: Option<i64>,
    weights: &HybridWeights,
    now: OffsetDateTime,
) -> Vec<Recommendation> {
    debug!(user_id, ?item_in_cart, ?weights, "hybrid recommendation");
    let mut merge = Merge::default();

    merge.absorb(
        Strategy::UserFrequency,
        weights,
        strategy::user_frequent_items(store, user_id),
    );
    if let Some(item_id) = item_in_cart {
        merge.absorb(
            Strategy::UserCoOrders,
            weights,
            strategy::user_co_ordered_items(store, user_id, item_id),
        );
        merge.absorb(
            Strategy::GlobalCoOrders,
            weights,
            strategy::global_co_ordered_items(store, item_id),
        );
    }
    merge.absorb(
        Strategy::TimeBasedTrend,
        weights,
        strategy::trending_items(store, TrendWindow::new(HYBRID_TREND_DAYS), now),
    );

    merge.finish(item_in_cart)
}

/// Per-item accumulation. Totals and dominant strategies are kept in parallel
/// maps; strategies are absorbed in inspection order, so a later strategy only
/// takes over dominance with a strictly larger contribution.
#[derive(Default)]
struct Merge {
    totals: HashMap<i64, f64>,
    dominant: HashMap<i64, (Strategy, f64)>,
    items: HashMap<i64, Item>,
}

impl Merge {
    fn absorb(
        &mut self,
        strategy: Strategy,
        weights: &HybridWeights,
        outcome: Result<Vec<Recommendation>>,
    ) {
        let recommendations = match outcome {
            Ok(recommendations) => recommendations,
            Err(err) => {
                warn!(%strategy, %err, "strategy failed, skipping its contribution");
                return;
            }
        };

        let weight = weights.weight(strategy);
        // An item listed twice by one strategy keeps its last score.
        let mut contributions: BTreeMap<i64, f64> = BTreeMap::new();
        for recommendation in recommendations {
            let id = recommendation.item.id;
            contributions.insert(id, recommendation.score * weight);
            self.items.insert(id, recommendation.item);
        }

        for (id, contribution) in contributions {
            *self.totals.entry(id).or_insert(0.0) += contribution;
            match self.dominant.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert((strategy, contribution));
                }
                Entry::Occupied(mut slot) => {
                    if contribution > slot.get().1 {
                        slot.insert((strategy, contribution));
                    }
                }
            }
        }
    }

    fn finish(mut self, item_in_cart: Option<i64>) -> Vec<Recommendation> {
        if let Some(target) = item_in_cart {
            self.totals.remove(&target);
            self.dominant.remove(&target);
            self.items.remove(&target);
        }

        let totals: BTreeMap<i64, f64> = self.totals.into_iter().collect();
        let mut results = Vec::with_capacity(totals.len());
        for (id, score) in totals {
            let (Some(item), Some(&(strategy, _))) = (self.items.remove(&id), self.dominant.get(&id))
            else {
                continue;
            };
            results.push(Recommendation {
                item,
                score,
                explanation: explanation(strategy, item_in_cart),
                strategy,
            });
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }
}

fn explanation(strategy: Strategy, item_in_cart: Option<i64>) -> String {
    match (strategy, item_in_cart) {
        (Strategy::UserFrequency, _) => "Recommended because you frequently order this".into(),
        (Strategy::UserCoOrders, Some(item)) => format!("You often order this with item {item}"),
        (Strategy::GlobalCoOrders, Some(item)) => {
            format!("Customers who order item {item} also order this")
        }
        (Strategy::TimeBasedTrend, _) => "This item is trending right now".into(),
        _ => "Recommended based on your preferences".into(),
    }
}
