//! Raw fact loading: CSV import, single-order recording, and import status.
//!
//! The importer is the only writer of users, items, orders and their
//! `HAS_MADE` / `HAS_ITEM` edges. Derived edges are left to
//! [`aggregate`](crate::aggregate).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::info;

use crate::aggregate::{self, RebuildSummary};
use crate::error::{Error, StoreError, StoreResult};
use crate::store::{query_as, tx_count, tx_query_as, FromRow, GraphStore, Params, Row, Transaction};

/// Default file names inside an import directory.
pub const USERS_FILE: &str = "users.csv";
/// See [`USERS_FILE`].
pub const ITEMS_FILE: &str = "items.csv";
/// See [`USERS_FILE`].
pub const ORDERS_FILE: &str = "orders.csv";
/// See [`USERS_FILE`].
pub const ORDER_ITEMS_FILE: &str = "order_items.csv";

const CLEAR_GRAPH: [&str; 8] = [
    "DELETE FROM processed_orders",
    "DELETE FROM ordered_along_with",
    "DELETE FROM has_ordered",
    "DELETE FROM has_item",
    "DELETE FROM has_made",
    "DELETE FROM orders",
    "DELETE FROM items",
    "DELETE FROM users",
];

const INSERT_USER: &str = "
    INSERT INTO users (id, name, email, created_at)
    VALUES (:id, :name, :email, :created_at)";

const INSERT_ITEM: &str = "
    INSERT INTO items (id, name, price, category, description)
    VALUES (:id, :name, :price, :category, :description)";

const INSERT_ORDER: &str = "
    INSERT INTO orders (id, created_at, total_amount)
    VALUES (:id, :created_at, :total_amount)";

const INSERT_HAS_MADE: &str =
    "INSERT INTO has_made (user_id, order_id) VALUES (:user_id, :order_id)";

const INSERT_HAS_ITEM: &str = "
    INSERT INTO has_item (order_id, item_id, quantity)
    VALUES (:order_id, :item_id, :quantity)
    ON CONFLICT (order_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity";

const USER_EXISTS: &str = "SELECT COUNT(*) AS count FROM users WHERE id = :id";
const ORDER_EXISTS: &str = "SELECT COUNT(*) AS count FROM orders WHERE id = :id";
const ITEM_PRICE: &str = "SELECT price FROM items WHERE id = :id";

const STATUS: &str = "
    SELECT
        (SELECT COUNT(*) FROM users) AS users,
        (SELECT COUNT(*) FROM items) AS items,
        (SELECT COUNT(*) FROM orders) AS orders,
        (SELECT COUNT(*) FROM has_ordered) AS has_ordered,
        (SELECT COUNT(*) FROM ordered_along_with) AS ordered_along_with";

/// Locations of the four CSV inputs.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// `user_id,name,email,created_at`
    pub users: PathBuf,
    /// `item_id,name,price,category,description`
    pub items: PathBuf,
    /// `order_id,user_id,created_at,total_amount`
    pub orders: PathBuf,
    /// `order_id,item_id,quantity`
    pub order_items: PathBuf,
}

impl ImportConfig {
    /// Uses the default file names inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        ImportConfig {
            users: dir.join(USERS_FILE),
            items: dir.join(ITEMS_FILE),
            orders: dir.join(ORDERS_FILE),
            order_items: dir.join(ORDER_ITEMS_FILE),
        }
    }
}

/// Counts written by [`run_import`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Users imported.
    pub users: u64,
    /// Items imported.
    pub items: u64,
    /// Orders imported, each with its owner edge.
    pub orders: u64,
    /// Distinct (order, item) line edges.
    pub order_lines: u64,
    /// Derived edges built after the raw facts.
    pub derived: RebuildSummary,
}

/// Node and edge counts currently in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStatus {
    /// User nodes.
    pub users: i64,
    /// Item nodes.
    pub items: i64,
    /// Order nodes.
    pub orders: i64,
    /// `HAS_ORDERED` edges.
    pub has_ordered: i64,
    /// Directed `ORDERED_ALONG_WITH` edges.
    pub ordered_along_with: i64,
}

impl FromRow for ImportStatus {
    fn from_row(row: &Row) -> StoreResult<Self> {
        Ok(ImportStatus {
            users: row.int("users")?,
            items: row.int("items")?,
            orders: row.int("orders")?,
            has_ordered: row.int("has_ordered")?,
            ordered_along_with: row.int("ordered_along_with")?,
        })
    }
}

/// A freshly placed order to record.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Unused order id.
    pub id: i64,
    /// Existing user placing the order.
    pub user_id: i64,
    /// Placement time.
    pub created_at: OffsetDateTime,
    /// Line items; repeated items are merged.
    pub lines: Vec<NewOrderLine>,
}

/// One line of a [`NewOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    /// Existing item id.
    pub item_id: i64,
    /// Units ordered, at least one.
    pub quantity: i64,
}

/// Error type for importing and recording raw facts.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Validation failure with a human readable message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Store failure while writing.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Failure while rebuilding derived edges.
    #[error(transparent)]
    Aggregate(#[from] Error),
}

impl From<String> for ImportError {
    fn from(value: String) -> Self {
        ImportError::Message(value)
    }
}

struct UserRecord {
    id: i64,
    name: String,
    email: String,
    created_at: OffsetDateTime,
}

struct ItemRecord {
    id: i64,
    name: String,
    price: f64,
    category: String,
    description: Option<String>,
}

struct OrderRecord {
    id: i64,
    user_id: i64,
    created_at: OffsetDateTime,
    total_amount: f64,
}

/// Replaces the whole graph with the facts in the four CSV files, then
/// rebuilds the derived edges.
///
/// Every file is parsed and cross-checked before the store is touched; the
/// raw facts are written in one transaction.
pub fn run_import(store: &dyn GraphStore, cfg: &ImportConfig) -> Result<ImportSummary, ImportError> {
    info!(path = %cfg.users.display(), "reading users");
    let users = read_users(&cfg.users)?;
    info!(path = %cfg.items.display(), "reading items");
    let items = read_items(&cfg.items)?;
    info!(path = %cfg.orders.display(), "reading orders");
    let orders = read_orders(&cfg.orders)?;
    info!(path = %cfg.order_items.display(), "reading order items");
    let lines = read_order_lines(&cfg.order_items)?;

    let user_ids = unique_ids(users.iter().map(|u| u.id), "user", &cfg.users)?;
    let item_ids = unique_ids(items.iter().map(|i| i.id), "item", &cfg.items)?;
    let order_ids = unique_ids(orders.iter().map(|o| o.id), "order", &cfg.orders)?;
    if let Some(order) = orders.iter().find(|o| !user_ids.contains(&o.user_id)) {
        return Err(format!(
            "order {} references unknown user {}",
            order.id, order.user_id
        )
        .into());
    }
    let mut merged: BTreeMap<(i64, i64), i64> = BTreeMap::new();
    for (order_id, item_id, quantity) in lines {
        if !order_ids.contains(&order_id) {
            return Err(format!("order line references unknown order {order_id}").into());
        }
        if !item_ids.contains(&item_id) {
            return Err(format!("order line references unknown item {item_id}").into());
        }
        let slot = merged.entry((order_id, item_id)).or_insert(0);
        *slot = slot
            .checked_add(quantity)
            .ok_or_else(|| format!("quantity overflow for order {order_id} item {item_id}"))?;
    }

    store.write_transaction(&mut |tx: &mut dyn Transaction| {
        let none = Params::new();
        for statement in CLEAR_GRAPH {
            tx.execute(statement, &none)?;
        }
        for user in &users {
            let params = Params::new()
                .with("id", user.id)
                .with("name", user.name.as_str())
                .with("email", user.email.as_str())
                .with("created_at", user.created_at);
            tx.execute(INSERT_USER, &params)?;
        }
        for item in &items {
            let params = Params::new()
                .with("id", item.id)
                .with("name", item.name.as_str())
                .with("price", item.price)
                .with("category", item.category.as_str())
                .with("description", item.description.as_deref());
            tx.execute(INSERT_ITEM, &params)?;
        }
        for order in &orders {
            let params = Params::new()
                .with("id", order.id)
                .with("created_at", order.created_at)
                .with("total_amount", order.total_amount);
            tx.execute(INSERT_ORDER, &params)?;
            let owner = Params::new()
                .with("user_id", order.user_id)
                .with("order_id", order.id);
            tx.execute(INSERT_HAS_MADE, &owner)?;
        }
        for (&(order_id, item_id), &quantity) in &merged {
            let params = Params::new()
                .with("order_id", order_id)
                .with("item_id", item_id)
                .with("quantity", quantity);
            tx.execute(INSERT_HAS_ITEM, &params)?;
        }
        Ok(())
    })?;
    info!(
        users = users.len(),
        items = items.len(),
        orders = orders.len(),
        order_lines = merged.len(),
        "imported raw facts"
    );

    let derived = aggregate::rebuild_all(store)?;
    Ok(ImportSummary {
        users: users.len() as u64,
        items: items.len() as u64,
        orders: orders.len() as u64,
        order_lines: merged.len() as u64,
        derived,
    })
}

/// Writes one new order with its owner and line edges. Derived edges are not
/// touched; follow up with [`aggregate::apply_new_order`].
pub fn record_order(store: &dyn GraphStore, order: &NewOrder) -> Result<(), ImportError> {
    if order.lines.is_empty() {
        return Err(format!("order {} has no items", order.id).into());
    }
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for line in &order.lines {
        if line.quantity < 1 {
            return Err(format!(
                "order {} item {} has quantity {}, expected at least 1",
                order.id, line.item_id, line.quantity
            )
            .into());
        }
        let slot = merged.entry(line.item_id).or_insert(0);
        *slot = slot
            .checked_add(line.quantity)
            .ok_or_else(|| format!("quantity overflow for item {}", line.item_id))?;
    }

    let mut rejection: Option<String> = None;
    store.write_transaction(&mut |tx: &mut dyn Transaction| {
        let total_amount = match check_new_order(tx, order, &merged)? {
            Ok(total) => total,
            Err(reason) => {
                rejection = Some(reason);
                return Ok(());
            }
        };
        let params = Params::new()
            .with("id", order.id)
            .with("created_at", order.created_at)
            .with("total_amount", total_amount);
        tx.execute(INSERT_ORDER, &params)?;
        let owner = Params::new()
            .with("user_id", order.user_id)
            .with("order_id", order.id);
        tx.execute(INSERT_HAS_MADE, &owner)?;
        for (&item_id, &quantity) in &merged {
            let params = Params::new()
                .with("order_id", order.id)
                .with("item_id", item_id)
                .with("quantity", quantity);
            tx.execute(INSERT_HAS_ITEM, &params)?;
        }
        Ok(())
    })?;
    match rejection {
        Some(message) => Err(ImportError::Message(message)),
        None => {
            info!(order_id = order.id, user_id = order.user_id, lines = merged.len(), "recorded order");
            Ok(())
        }
    }
}

struct Price(f64);

impl FromRow for Price {
    fn from_row(row: &Row) -> StoreResult<Self> {
        row.float("price").map(Price)
    }
}

/// Validates references for a new order and returns its total, or the reason
/// it is rejected.
fn check_new_order(
    tx: &mut dyn Transaction,
    order: &NewOrder,
    merged: &BTreeMap<i64, i64>,
) -> StoreResult<Result<f64, String>> {
    let user = Params::new().with("id", order.user_id);
    if tx_count(tx, USER_EXISTS, &user)? == 0 {
        return Ok(Err(format!("user {} not found", order.user_id)));
    }
    let existing = Params::new().with("id", order.id);
    if tx_count(tx, ORDER_EXISTS, &existing)? > 0 {
        return Ok(Err(format!("order {} already exists", order.id)));
    }
    let mut total = 0.0;
    for (&item_id, &quantity) in merged {
        let prices: Vec<Price> = tx_query_as(tx, ITEM_PRICE, &Params::new().with("id", item_id))?;
        match prices.first() {
            Some(price) => total += price.0 * quantity as f64,
            None => return Ok(Err(format!("item {item_id} not found"))),
        }
    }
    Ok(Ok(total))
}

/// Node and derived edge counts.
pub fn import_status(store: &dyn GraphStore) -> crate::Result<ImportStatus> {
    let rows: Vec<ImportStatus> = query_as(store, STATUS, &Params::new())?;
    Ok(rows.first().copied().unwrap_or_default())
}

/// Parses an import timestamp: RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` (UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            raw,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .map(PrimitiveDateTime::assume_utc)
    .ok()
    .or_else(|| {
        Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .ok()
            .map(|date| date.midnight().assume_utc())
    })
}

fn unique_ids(
    ids: impl Iterator<Item = i64>,
    kind: &str,
    path: &Path,
) -> Result<HashSet<i64>, ImportError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(format!("duplicate {kind} id '{id}' in {}", path.display()).into());
        }
    }
    Ok(seen)
}

fn read_users(path: &Path) -> Result<Vec<UserRecord>, ImportError> {
    read_records(path, &["user_id", "name", "email", "created_at"], |row| {
        Ok(UserRecord {
            id: row.int(0)?,
            name: row.required(1)?.to_owned(),
            email: row.required(2)?.to_owned(),
            created_at: row.timestamp(3)?,
        })
    })
}

fn read_items(path: &Path) -> Result<Vec<ItemRecord>, ImportError> {
    read_records(
        path,
        &["item_id", "name", "price", "category", "description"],
        |row| {
            let price = row.float(2)?;
            if price < 0.0 {
                return Err(row.invalid(2, "price must not be negative"));
            }
            Ok(ItemRecord {
                id: row.int(0)?,
                name: row.required(1)?.to_owned(),
                price,
                category: row.required(3)?.to_owned(),
                description: row.optional(4).map(str::to_owned),
            })
        },
    )
}

fn read_orders(path: &Path) -> Result<Vec<OrderRecord>, ImportError> {
    read_records(
        path,
        &["order_id", "user_id", "created_at", "total_amount"],
        |row| {
            Ok(OrderRecord {
                id: row.int(0)?,
                user_id: row.int(1)?,
                created_at: row.timestamp(2)?,
                total_amount: row.float(3)?,
            })
        },
    )
}

fn read_order_lines(path: &Path) -> Result<Vec<(i64, i64, i64)>, ImportError> {
    read_records(path, &["order_id", "item_id", "quantity"], |row| {
        let quantity = row.int(2)?;
        if quantity < 1 {
            return Err(row.invalid(2, "quantity must be at least 1"));
        }
        Ok((row.int(0)?, row.int(1)?, quantity))
    })
}

/// Reads every record of `path`, resolving `columns` by header name. The
/// parser sees cells in the order of `columns`.
fn read_records<T>(
    path: &Path,
    columns: &[&'static str],
    mut parse: impl FnMut(&CsvRow<'_>) -> Result<T, ImportError>,
) -> Result<Vec<T>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let indexes = columns
        .iter()
        .map(|column| find_column(&headers, column, path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = CsvRow {
            path,
            record: &record,
            columns,
            indexes: &indexes,
        };
        out.push(parse(&row)?);
    }
    Ok(out)
}

fn find_column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize, ImportError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| {
            ImportError::Message(format!(
                "column '{name}' not found in {}",
                path.display()
            ))
        })
}

struct CsvRow<'a> {
    path: &'a Path,
    record: &'a StringRecord,
    columns: &'a [&'static str],
    indexes: &'a [usize],
}

impl CsvRow<'_> {
    fn optional(&self, slot: usize) -> Option<&str> {
        self.record
            .get(self.indexes[slot])
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, slot: usize) -> Result<&str, ImportError> {
        self.optional(slot)
            .ok_or_else(|| self.invalid(slot, "missing value"))
    }

    fn int(&self, slot: usize) -> Result<i64, ImportError> {
        let raw = self.required(slot)?;
        raw.parse()
            .map_err(|_| self.invalid(slot, &format!("'{raw}' is not an integer")))
    }

    fn float(&self, slot: usize) -> Result<f64, ImportError> {
        let raw = self.required(slot)?;
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.invalid(slot, &format!("'{raw}' is not a number")))
    }

    fn timestamp(&self, slot: usize) -> Result<OffsetDateTime, ImportError> {
        let raw = self.required(slot)?;
        parse_timestamp(raw)
            .ok_or_else(|| self.invalid(slot, &format!("'{raw}' is not a timestamp")))
    }

    fn invalid(&self, slot: usize, reason: &str) -> ImportError {
        let line = self
            .record
            .position()
            .map_or_else(|| "?".to_string(), |pos| pos.line().to_string());
        ImportError::Message(format!(
            "{}:{line}: column '{}': {reason}",
            self.path.display(),
            self.columns[slot]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamps_accept_common_shapes() {
        assert_eq!(
            parse_timestamp("2024-03-01T10:15:00Z"),
            Some(datetime!(2024-03-01 10:15:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-01T12:15:00+02:00"),
            Some(datetime!(2024-03-01 10:15:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-01 10:15:00"),
            Some(datetime!(2024-03-01 10:15:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-01T10:15:00"),
            Some(datetime!(2024-03-01 10:15:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-01"),
            Some(datetime!(2024-03-01 00:00:00 UTC))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn default_file_names() {
        let cfg = ImportConfig::from_dir("/data");
        assert_eq!(cfg.users, PathBuf::from("/data/users.csv"));
        assert_eq!(cfg.order_items, PathBuf::from("/data/order_items.csv"));
    }
}
