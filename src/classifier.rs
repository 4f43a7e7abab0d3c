//! New vs. experienced customer classification and the weight presets that go
//! with each class.

use tracing::warn;

use crate::error::Result;
use crate::model::HybridWeights;
use crate::store::{count, GraphStore, Params};

/// Users with fewer recorded orders than this are "new".
pub const NEW_USER_ORDER_THRESHOLD: i64 = 3;

/// Balanced preset, also the fallback when classification fails.
pub const DEFAULT_WEIGHTS: HybridWeights = HybridWeights {
    user_frequency: 0.4,
    user_co_orders: 0.3,
    global_co_orders: 0.2,
    time_based_trend: 0.1,
};

/// Leans on global and trend signals for users with little history.
pub const NEW_USER_WEIGHTS: HybridWeights = HybridWeights {
    user_frequency: 0.1,
    user_co_orders: 0.1,
    global_co_orders: 0.5,
    time_based_trend: 0.3,
};

/// Leans on the user's own frequency and co-order history.
pub const EXPERIENCED_USER_WEIGHTS: HybridWeights = HybridWeights {
    user_frequency: 0.5,
    user_co_orders: 0.3,
    global_co_orders: 0.1,
    time_based_trend: 0.1,
};

const USER_ORDER_COUNT: &str =
    "SELECT COUNT(*) AS count FROM has_made WHERE user_id = :user_id";

/// Experience class of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserClass {
    /// Fewer than [`NEW_USER_ORDER_THRESHOLD`] orders, including unknown users.
    New,
    /// At least [`NEW_USER_ORDER_THRESHOLD`] orders.
    Experienced,
}

impl UserClass {
    /// Class for a given number of placed orders.
    pub fn from_order_count(orders: i64) -> Self {
        if orders < NEW_USER_ORDER_THRESHOLD {
            UserClass::New
        } else {
            UserClass::Experienced
        }
    }

    /// Weight preset for this class.
    pub fn weights(self) -> HybridWeights {
        match self {
            UserClass::New => NEW_USER_WEIGHTS,
            UserClass::Experienced => EXPERIENCED_USER_WEIGHTS,
        }
    }
}

/// Classifies a user by counting their placed orders.
pub fn classify_user(store: &dyn GraphStore, user_id: i64) -> Result<UserClass> {
    let params = Params::new().with("user_id", user_id);
    let orders = count(store, USER_ORDER_COUNT, &params)?;
    Ok(UserClass::from_order_count(orders))
}

/// Whether the user has fewer than three recorded orders.
pub fn is_new_user(store: &dyn GraphStore, user_id: i64) -> Result<bool> {
    Ok(classify_user(store, user_id)? == UserClass::New)
}

/// Preset for the user's class, or [`DEFAULT_WEIGHTS`] when the class cannot
/// be determined. Never fails.
pub fn weights_for_user(store: &dyn GraphStore, user_id: i64) -> HybridWeights {
    match classify_user(store, user_id) {
        Ok(class) => class.weights(),
        Err(err) => {
            warn!(user_id, %err, "user classification failed, using default weights");
            DEFAULT_WEIGHTS
        }
    }
}

/// Per-strategy overrides applied on top of a preset, typically parsed from
/// transport parameters. Unparsable, negative or non-finite values are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightOverrides {
    /// Replaces `user_frequency`.
    pub user_frequency: Option<f64>,
    /// Replaces `user_co_orders`.
    pub user_co_orders: Option<f64>,
    /// Replaces `global_co_orders`.
    pub global_co_orders: Option<f64>,
    /// Replaces `time_based_trend`.
    pub time_based_trend: Option<f64>,
}

impl WeightOverrides {
    /// Builds overrides from raw strings.
    pub fn parse(
        user_frequency: Option<&str>,
        user_co_orders: Option<&str>,
        global_co_orders: Option<&str>,
        time_based_trend: Option<&str>,
    ) -> Self {
        WeightOverrides {
            user_frequency: parse_weight(user_frequency),
            user_co_orders: parse_weight(user_co_orders),
            global_co_orders: parse_weight(global_co_orders),
            time_based_trend: parse_weight(time_based_trend),
        }
    }

    /// Returns `base` with every present override substituted.
    pub fn apply(&self, base: HybridWeights) -> HybridWeights {
        HybridWeights {
            user_frequency: self.user_frequency.unwrap_or(base.user_frequency),
            user_co_orders: self.user_co_orders.unwrap_or(base.user_co_orders),
            global_co_orders: self.global_co_orders.unwrap_or(base.global_co_orders),
            time_based_trend: self.time_based_trend.unwrap_or(base.time_based_trend),
        }
    }
}

fn parse_weight(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|weight| weight.is_finite() && *weight >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_orders_make_an_experienced_user() {
        assert_eq!(UserClass::from_order_count(0), UserClass::New);
        assert_eq!(UserClass::from_order_count(2), UserClass::New);
        assert_eq!(UserClass::from_order_count(3), UserClass::Experienced);
        assert_eq!(UserClass::from_order_count(40), UserClass::Experienced);
    }

    #[test]
    fn presets_follow_the_class() {
        assert_eq!(UserClass::New.weights(), NEW_USER_WEIGHTS);
        assert_eq!(UserClass::Experienced.weights(), EXPERIENCED_USER_WEIGHTS);
        assert_eq!(HybridWeights::default(), DEFAULT_WEIGHTS);
    }

    #[test]
    fn overrides_ignore_garbage() {
        let overrides = WeightOverrides::parse(Some("0.9"), Some("x"), Some("-1"), Some("NaN"));
        let weights = overrides.apply(DEFAULT_WEIGHTS);
        assert_eq!(weights.user_frequency, 0.9);
        assert_eq!(weights.user_co_orders, DEFAULT_WEIGHTS.user_co_orders);
        assert_eq!(weights.global_co_orders, DEFAULT_WEIGHTS.global_co_orders);
        assert_eq!(weights.time_based_trend, DEFAULT_WEIGHTS.time_based_trend);
    }
}
