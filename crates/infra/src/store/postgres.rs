//! Postgres-backed stores.
//!
//! Quantities are stored as `BIGINT` milli-units and money as `BIGINT` cents,
//! so values round-trip exactly. An order's reservation is a `JSONB` object
//! of ingredient id to milli-units. The schema is embedded and applied with
//! [`migrate`] (idempotent `CREATE TABLE IF NOT EXISTS` / `ADD COLUMN IF NOT EXISTS`).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | Other | N/A | `Backend` |
//!
//! ## Stock guard
//!
//! A consume is a single statement:
//! `UPDATE inventory SET quantity_milli = quantity_milli - $2 WHERE id = $1 AND quantity_milli >= $2`.
//! Zero rows affected means either the ingredient is missing or stock is
//! short; a follow-up read tells the two apart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use hotcoffee_core::{ExpectedVersion, IngredientId, MenuItemId, Money, OrderId, Quantity};
use hotcoffee_inventory::{InventoryItem, NewInventoryItem, ReservationPlan, StockAdjustment};
use hotcoffee_menu::{IngredientRequirement, MenuCategory, MenuItem, NewMenuItem};
use hotcoffee_orders::{Order, OrderLineItem, OrderSnapshot, OrderStatus};

use super::{InventoryStore, MenuCatalog, OrderStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory (
        id                  TEXT PRIMARY KEY,
        name                TEXT NOT NULL,
        quantity_milli      BIGINT NOT NULL CHECK (quantity_milli >= 0),
        unit                TEXT NOT NULL,
        min_threshold_milli BIGINT NOT NULL DEFAULT 0 CHECK (min_threshold_milli >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS menu_items (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category    TEXT NOT NULL,
        price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
        available   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS menu_item_ingredients (
        menu_item_id   TEXT NOT NULL REFERENCES menu_items (id) ON DELETE CASCADE,
        position       INTEGER NOT NULL,
        ingredient_id  TEXT NOT NULL,
        quantity_milli BIGINT NOT NULL CHECK (quantity_milli > 0),
        PRIMARY KEY (menu_item_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id                 UUID PRIMARY KEY,
        customer_name      TEXT NOT NULL,
        status             TEXT NOT NULL CHECK (status IN ('pending', 'closed')),
        total_amount_cents BIGINT NOT NULL CHECK (total_amount_cents >= 0),
        created_at         TIMESTAMPTZ NOT NULL,
        updated_at         TIMESTAMPTZ NOT NULL,
        version            BIGINT NOT NULL,
        reservation        JSONB NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    ALTER TABLE orders ADD COLUMN IF NOT EXISTS reservation JSONB NOT NULL DEFAULT '{}'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        order_id            UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        position            INTEGER NOT NULL,
        product_id          TEXT NOT NULL,
        quantity            BIGINT NOT NULL CHECK (quantity > 0),
        price_at_time_cents BIGINT NOT NULL CHECK (price_at_time_cents >= 0),
        PRIMARY KEY (order_id, position)
    )
    "#,
];

/// Create the tables used by the Postgres stores if they do not exist.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    Ok(())
}

/// Postgres menu catalog.
#[derive(Debug, Clone)]
pub struct PostgresMenuCatalog {
    pool: Arc<PgPool>,
}

impl PostgresMenuCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert or replace a menu item together with its recipe.
    #[instrument(skip(self, item), fields(menu_item_id = %item.id_typed()), err)]
    pub async fn upsert(&self, item: &MenuItem) -> Result<(), StoreError> {
        let mut tx = self.begin("upsert_menu_item").await?;

        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, description, category, price_cents, available)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                price_cents = EXCLUDED.price_cents,
                available = EXCLUDED.available
            "#,
        )
        .bind(item.id_typed().as_str())
        .bind(item.name())
        .bind(item.description())
        .bind(item.category().as_str())
        .bind(to_i64(item.price().cents())?)
        .bind(item.is_available())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_menu_item", e))?;

        sqlx::query("DELETE FROM menu_item_ingredients WHERE menu_item_id = $1")
            .bind(item.id_typed().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_item", e))?;

        for (position, req) in item.ingredients().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO menu_item_ingredients (menu_item_id, position, ingredient_id, quantity_milli)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(item.id_typed().as_str())
            .bind(to_i32(position)?)
            .bind(req.ingredient_id.as_str())
            .bind(to_i64(req.quantity_per_unit.milli())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_item", e))
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn load_recipes(
        &self,
        menu_item_ids: &[String],
    ) -> Result<HashMap<String, Vec<IngredientRequirement>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT menu_item_id, ingredient_id, quantity_milli
            FROM menu_item_ingredients
            WHERE menu_item_id = ANY($1)
            ORDER BY menu_item_id, position
            "#,
        )
        .bind(menu_item_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_recipes", e))?;

        let mut recipes: HashMap<String, Vec<IngredientRequirement>> = HashMap::new();
        for row in rows {
            let menu_item_id: String = get(&row, "menu_item_id")?;
            let ingredient_id: String = get(&row, "ingredient_id")?;
            let quantity_milli: i64 = get(&row, "quantity_milli")?;
            recipes
                .entry(menu_item_id)
                .or_default()
                .push(IngredientRequirement::new(
                    IngredientId::new(ingredient_id).map_err(decode_error)?,
                    Quantity::from_milli(to_u64(quantity_milli)?),
                ));
        }
        Ok(recipes)
    }
}

fn menu_item_from_row(
    row: &PgRow,
    recipes: &mut HashMap<String, Vec<IngredientRequirement>>,
) -> Result<MenuItem, StoreError> {
    let id: String = get(row, "id")?;
    let category: String = get(row, "category")?;
    let ingredients = recipes.remove(&id).unwrap_or_default();

    MenuItem::new(NewMenuItem {
        id: MenuItemId::new(id).map_err(decode_error)?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        category: category.parse::<MenuCategory>().map_err(decode_error)?,
        price: Money::from_cents(to_u64(get(row, "price_cents")?)?),
        available: get(row, "available")?,
        ingredients,
    })
    .map_err(decode_error)
}

#[async_trait]
impl MenuCatalog for PostgresMenuCatalog {
    #[instrument(skip(self), fields(menu_item_id = %id), err)]
    async fn get_menu_item(&self, id: &MenuItemId) -> Result<MenuItem, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, category, price_cents, available
            FROM menu_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_menu_item", e))?
        .ok_or_else(|| StoreError::NotFound(format!("menu item '{id}'")))?;

        let mut recipes = self.load_recipes(&[id.as_str().to_string()]).await?;
        menu_item_from_row(&row, &mut recipes)
    }

    #[instrument(skip(self), fields(item_count = tracing::field::Empty), err)]
    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, category, price_cents, available
            FROM menu_items
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_menu_items", e))?;

        let ids = rows
            .iter()
            .map(|row| get::<String>(row, "id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut recipes = self.load_recipes(&ids).await?;

        let items = rows
            .iter()
            .map(|row| menu_item_from_row(row, &mut recipes))
            .collect::<Result<Vec<_>, _>>()?;
        Span::current().record("item_count", items.len());
        Ok(items)
    }
}

/// Postgres ingredient stock.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Provision or replace a stock record (bypasses the ledger; setup only).
    #[instrument(skip(self, item), fields(ingredient_id = %item.id_typed()), err)]
    pub async fn upsert(&self, item: &InventoryItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory (id, name, quantity_milli, unit, min_threshold_milli)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                quantity_milli = EXCLUDED.quantity_milli,
                unit = EXCLUDED.unit,
                min_threshold_milli = EXCLUDED.min_threshold_milli
            "#,
        )
        .bind(item.id_typed().as_str())
        .bind(item.name())
        .bind(to_i64(item.quantity().milli())?)
        .bind(item.unit())
        .bind(to_i64(item.min_threshold().milli())?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_inventory_item", e))?;
        Ok(())
    }

    async fn current_quantity(&self, id: &IngredientId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT quantity_milli FROM inventory WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_quantity", e))?;
        row.map(|r| get::<i64>(&r, "quantity_milli")).transpose()
    }
}

fn inventory_item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let id: String = get(row, "id")?;
    InventoryItem::new(NewInventoryItem {
        id: IngredientId::new(id).map_err(decode_error)?,
        name: get(row, "name")?,
        quantity: Quantity::from_milli(to_u64(get(row, "quantity_milli")?)?),
        unit: get(row, "unit")?,
        min_threshold: Quantity::from_milli(to_u64(get(row, "min_threshold_milli")?)?),
    })
    .map_err(decode_error)
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self), fields(ingredient_id = %id), err)]
    async fn get(&self, id: &IngredientId) -> Result<InventoryItem, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, quantity_milli, unit, min_threshold_milli
            FROM inventory
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_inventory_item", e))?
        .ok_or_else(|| StoreError::NotFound(format!("ingredient '{id}'")))?;

        inventory_item_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, quantity_milli, unit, min_threshold_milli
            FROM inventory
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_inventory", e))?;

        rows.iter().map(inventory_item_from_row).collect()
    }

    #[instrument(skip(self), fields(ingredient_id = %id), err)]
    async fn conditional_adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<Quantity, StoreError> {
        let amount = to_i64(adjustment.amount().milli())?;

        let statement = match adjustment {
            StockAdjustment::Consume(_) => {
                r#"
                UPDATE inventory
                SET quantity_milli = quantity_milli - $2
                WHERE id = $1 AND quantity_milli >= $2
                RETURNING quantity_milli
                "#
            }
            StockAdjustment::Restore(_) => {
                r#"
                UPDATE inventory
                SET quantity_milli = quantity_milli + $2
                WHERE id = $1
                RETURNING quantity_milli
                "#
            }
        };

        let updated = sqlx::query(statement)
            .bind(id.as_str())
            .bind(amount)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("conditional_adjust", e))?;

        match updated {
            Some(row) => Ok(Quantity::from_milli(to_u64(get(&row, "quantity_milli")?)?)),
            None => match self.current_quantity(id).await? {
                None => Err(StoreError::NotFound(format!("ingredient '{id}'"))),
                Some(current) => Err(StoreError::Conflict(format!(
                    "stock cannot go negative (have {}, consume {})",
                    Quantity::from_milli(to_u64(current)?),
                    adjustment.amount()
                ))),
            },
        }
    }
}

/// Postgres order table (`orders` + `order_items`).
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn load_lines(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<OrderLineItem>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, price_at_time_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let mut lines: HashMap<Uuid, Vec<OrderLineItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = get(&row, "order_id")?;
            let product_id: String = get(&row, "product_id")?;
            let quantity: i64 = get(&row, "quantity")?;
            lines.entry(order_id).or_default().push(OrderLineItem {
                product_id: MenuItemId::new(product_id).map_err(decode_error)?,
                quantity: u32::try_from(quantity)
                    .map_err(|_| StoreError::Backend(format!("invalid line quantity {quantity}")))?,
                price_at_time: Money::from_cents(to_u64(get(&row, "price_at_time_cents")?)?),
            });
        }
        Ok(lines)
    }
}

async fn insert_order_row(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    operation: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, customer_name, status, total_amount_cents, created_at, updated_at, version, reservation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order.id_typed().as_uuid())
    .bind(order.customer_name())
    .bind(order.status().as_str())
    .bind(to_i64(order.total_amount().cents())?)
    .bind(order.created_at())
    .bind(order.updated_at())
    .bind(to_i64(hotcoffee_core::AggregateRoot::version(order))?)
    .bind(Json(order.reservation()))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error(operation, e))?;

    insert_order_lines(tx, order, operation).await
}

async fn insert_order_lines(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    operation: &str,
) -> Result<(), StoreError> {
    for (position, line) in order.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, position, product_id, quantity, price_at_time_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(to_i32(position)?)
        .bind(line.product_id.as_str())
        .bind(i64::from(line.quantity))
        .bind(to_i64(line.price_at_time.cents())?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    }
    Ok(())
}

fn order_from_row(
    row: &PgRow,
    lines: &mut HashMap<Uuid, Vec<OrderLineItem>>,
) -> Result<Order, StoreError> {
    let id: Uuid = get(row, "id")?;
    let status: String = get(row, "status")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    let updated_at: DateTime<Utc> = get(row, "updated_at")?;
    let Json(reservation): Json<ReservationPlan> = get(row, "reservation")?;

    Order::try_from(OrderSnapshot {
        id: OrderId::from_uuid(id),
        customer_name: get(row, "customer_name")?,
        items: lines.remove(&id).unwrap_or_default(),
        status: status.parse::<OrderStatus>().map_err(decode_error)?,
        total_amount: Money::from_cents(to_u64(get(row, "total_amount_cents")?)?),
        created_at,
        updated_at,
        version: to_u64(get(row, "version")?)?,
        reservation,
    })
    .map_err(decode_error)
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.begin("insert_order").await?;
        insert_order_row(&mut tx, order, "insert_order").await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))
    }

    #[instrument(skip(self, orders), fields(order_count = orders.len()), err)]
    async fn insert_many(&self, orders: &[Order]) -> Result<(), StoreError> {
        let mut tx = self.begin("insert_orders").await?;
        for order in orders {
            insert_order_row(&mut tx, order, "insert_orders").await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_orders", e))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut tx = self.begin("update_order").await?;
        let id = order.id_typed();

        let current = sqlx::query("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        let current_version = to_u64(get(&current, "version")?)?;
        expected
            .check(current_version)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE orders
            SET customer_name = $2,
                status = $3,
                total_amount_cents = $4,
                updated_at = $5,
                version = $6,
                reservation = $7
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.customer_name())
        .bind(order.status().as_str())
        .bind(to_i64(order.total_amount().cents())?)
        .bind(order.updated_at())
        .bind(to_i64(hotcoffee_core::AggregateRoot::version(order))?)
        .bind(Json(order.reservation()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;
        insert_order_lines(&mut tx, order, "update_order").await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("update_order", e))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete(&self, id: OrderId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_name, status, total_amount_cents, created_at, updated_at, version,
                   reservation
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?
        .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        let mut lines = self.load_lines(&[*id.as_uuid()]).await?;
        order_from_row(&row, &mut lines)
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_name, status, total_amount_cents, created_at, updated_at, version,
                   reservation
            FROM orders
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let ids = rows
            .iter()
            .map(|row| get::<Uuid>(row, "id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        rows.iter()
            .map(|row| order_from_row(row, &mut lines))
            .collect()
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column '{column}': {e}")))
}

fn decode_error(err: hotcoffee_core::DomainError) -> StoreError {
    StoreError::Backend(format!("stored row failed validation: {err}"))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("value {value} exceeds BIGINT")))
}

fn to_i32(value: usize) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("position {value} exceeds INTEGER")))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("negative stored value {value}")))
}

/// Map SQLx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
