#![allow(dead_code)]

use menugraph::store::{GraphStore, Params, Row, SqliteGraphStore};
use menugraph::StoreResult;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

/// Reference "now" shared by the time-sensitive tests.
pub const NOW: OffsetDateTime = datetime!(2024-05-10 12:00:00 UTC);

pub fn days_ago(days: i64) -> OffsetDateTime {
    NOW - Duration::days(days)
}

pub fn memory_store() -> SqliteGraphStore {
    SqliteGraphStore::open_in_memory().expect("open in-memory store")
}

pub fn add_user(store: &dyn GraphStore, id: i64) -> StoreResult<()> {
    let params = Params::new()
        .with("id", id)
        .with("name", format!("User {id}"))
        .with("email", format!("user{id}@example.com"))
        .with("created_at", days_ago(365));
    store.execute_write(
        "INSERT INTO users (id, name, email, created_at) VALUES (:id, :name, :email, :created_at)",
        &params,
    )?;
    Ok(())
}

pub fn add_item(store: &dyn GraphStore, id: i64, category: &str, price: f64) -> StoreResult<()> {
    let params = Params::new()
        .with("id", id)
        .with("name", format!("Item {id}"))
        .with("price", price)
        .with("category", category);
    store.execute_write(
        "INSERT INTO items (id, name, price, category) VALUES (:id, :name, :price, :category)",
        &params,
    )?;
    Ok(())
}

/// Users `1..=users` and items `1..=items`, all priced 10.0 in category `Mains`.
pub fn seed_catalog(store: &dyn GraphStore, users: i64, items: i64) -> StoreResult<()> {
    for id in 1..=users {
        add_user(store, id)?;
    }
    for id in 1..=items {
        add_item(store, id, "Mains", 10.0)?;
    }
    Ok(())
}

/// Writes raw order facts only; derived edges are untouched.
pub fn add_order(
    store: &dyn GraphStore,
    id: i64,
    user_id: Option<i64>,
    at: OffsetDateTime,
    lines: &[(i64, i64)],
) -> StoreResult<()> {
    let order = Params::new()
        .with("id", id)
        .with("created_at", at)
        .with("total_amount", 0.0);
    store.execute_write(
        "INSERT INTO orders (id, created_at, total_amount) VALUES (:id, :created_at, :total_amount)",
        &order,
    )?;
    if let Some(user_id) = user_id {
        let owner = Params::new().with("user_id", user_id).with("order_id", id);
        store.execute_write(
            "INSERT INTO has_made (user_id, order_id) VALUES (:user_id, :order_id)",
            &owner,
        )?;
    }
    for &(item_id, quantity) in lines {
        let line = Params::new()
            .with("order_id", id)
            .with("item_id", item_id)
            .with("quantity", quantity);
        store.execute_write(
            "INSERT INTO has_item (order_id, item_id, quantity) VALUES (:order_id, :item_id, :quantity)",
            &line,
        )?;
    }
    Ok(())
}

/// `(user, item, times)` rows of HAS_ORDERED, sorted.
pub fn has_ordered(store: &dyn GraphStore) -> StoreResult<Vec<(i64, i64, i64)>> {
    triples(
        store,
        "SELECT user_id AS a, item_id AS b, times FROM has_ordered ORDER BY a, b",
    )
}

/// `(from, to, times)` rows of ORDERED_ALONG_WITH, sorted.
pub fn ordered_along_with(store: &dyn GraphStore) -> StoreResult<Vec<(i64, i64, i64)>> {
    triples(
        store,
        "SELECT from_item AS a, to_item AS b, times FROM ordered_along_with ORDER BY a, b",
    )
}

fn triples(store: &dyn GraphStore, query: &str) -> StoreResult<Vec<(i64, i64, i64)>> {
    store
        .execute_read(query, &Params::new())?
        .iter()
        .map(|row: &Row| -> StoreResult<(i64, i64, i64)> {
            Ok((row.int("a")?, row.int("b")?, row.int("times")?))
        })
        .collect()
}
