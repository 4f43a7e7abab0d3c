//! Plain listings of the imported nodes.

use crate::error::Result;
use crate::model::{Item, User};
use crate::store::{query_as, GraphStore, Params};

const ALL_ITEMS: &str = "
    SELECT id AS item_id, name, price, category, description
    FROM items
    ORDER BY category, name, id";

const ITEMS_BY_CATEGORY: &str = "
    SELECT id AS item_id, name, price, category, description
    FROM items
    WHERE category = :category
    ORDER BY name, id";

const ALL_USERS: &str = "
    SELECT id AS user_id, name, email, created_at
    FROM users
    ORDER BY name, id";

/// Every menu item, grouped by category.
pub fn all_items(store: &dyn GraphStore) -> Result<Vec<Item>> {
    Ok(query_as(store, ALL_ITEMS, &Params::new())?)
}

/// Menu items of one category, by name.
pub fn items_by_category(store: &dyn GraphStore, category: &str) -> Result<Vec<Item>> {
    let params = Params::new().with("category", category);
    Ok(query_as(store, ITEMS_BY_CATEGORY, &params)?)
}

/// Every customer, by name.
pub fn all_users(store: &dyn GraphStore) -> Result<Vec<User>> {
    Ok(query_as(store, ALL_USERS, &Params::new())?)
}
