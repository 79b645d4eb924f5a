use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    BuyerId, Cart, Money, Order, OrderId, OrderLine, OrderStatus, Product, ProductId,
    ShippingAddress, StockItem, Version,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CartStore, OrderStore, ProductStore},
};

const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, discount_price_cents, stock, sold, version";

/// PostgreSQL-backed implementation of all three stores.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Adds or replaces a catalog entry, including its stock counters.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, discount_price_cents, stock, sold, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                discount_price_cents = EXCLUDED.discount_price_cents,
                stock = EXCLUDED.stock,
                sold = EXCLUDED.sold,
                version = EXCLUDED.version,
                updated_at = NOW()
            "#,
        )
        .bind(product.id().as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.discount_price.map(|m| m.cents()))
        .bind(i64::from(product.inventory.stock))
        .bind(i64::from(product.inventory.sold))
        .bind(product.inventory.version.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores a cart, replacing its previous contents.
    pub async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO carts (buyer_id) VALUES ($1)
             ON CONFLICT (buyer_id) DO UPDATE SET updated_at = NOW()",
        )
        .bind(cart.buyer_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1")
            .bind(cart.buyer_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for (product_id, quantity) in &cart.items {
            sqlx::query(
                "INSERT INTO cart_items (buyer_id, product_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(cart.buyer_id.as_uuid())
            .bind(product_id.as_str())
            .bind(i64::from(*quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let id: String = row.try_get("id")?;
        let discount: Option<i64> = row.try_get("discount_price_cents")?;

        Ok(Product {
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount_price: discount.map(Money::from_cents),
            inventory: StockItem {
                stock: to_quantity(&id, "stock", row.try_get("stock")?)?,
                sold: to_quantity(&id, "sold", row.try_get("sold")?)?,
                version: Version::new(row.try_get("version")?),
                product_id: ProductId::new(id),
            },
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let lines: serde_json::Value = row.try_get("lines")?;
        let shipping_address: serde_json::Value = row.try_get("shipping_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: BuyerId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            lines: serde_json::from_value::<Vec<OrderLine>>(lines)?,
            shipping_address: serde_json::from_value::<ShippingAddress>(shipping_address)?,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown order status '{status}'")))?,
        })
    }
}

fn to_quantity(product_id: &str, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        StoreError::Corrupt(format!("{column} of product {product_id} out of range: {value}"))
    })
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn get_by_id(&self, product_id: &ProductId) -> Result<Product> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        Self::row_to_product(&row)
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let keys: Vec<String> = product_ids.iter().map(|id| id.to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&keys[..])
        .fetch_all(&self.pool)
        .await?;

        let found: HashMap<ProductId, Product> = rows
            .iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id().clone(), p)))
            .collect::<Result<_>>()?;

        product_ids
            .iter()
            .map(|id| {
                found
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::ProductNotFound(id.clone()))
            })
            .collect()
    }

    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    async fn conditional_update(
        &self,
        product_id: &ProductId,
        expected: Version,
        new_stock: u32,
        new_sold: u32,
    ) -> Result<Version> {
        let committed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = $2, sold = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $4
            RETURNING version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(new_stock))
        .bind(i64::from(new_sold))
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = committed {
            return Ok(Version::new(version));
        }

        // Nothing matched: either the row is gone or its version moved on.
        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM products WHERE id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => {
                tracing::debug!(%expected, actual, "conditional stock update lost the race");
                Err(StoreError::VersionConflict {
                    product_id: product_id.clone(),
                    expected,
                    actual: Version::new(actual),
                })
            }
            None => Err(StoreError::ProductNotFound(product_id.clone())),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: Order) -> Result<OrderId> {
        let lines = serde_json::to_value(&order.lines)?;
        let address = serde_json::to_value(&order.shipping_address)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, lines, shipping_address, total_cents, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.buyer_id.as_uuid())
        .bind(lines)
        .bind(address)
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateOrder(order.id);
            }
            StoreError::Database(e)
        })?;

        Ok(order.id)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, buyer_id, lines, shipping_address, total_cents, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, buyer_id: BuyerId) -> Result<Option<Cart>> {
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT buyer_id FROM carts WHERE buyer_id = $1")
                .bind(buyer_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query("SELECT product_id, quantity FROM cart_items WHERE buyer_id = $1")
            .bind(buyer_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        let mut items = BTreeMap::new();
        for row in rows {
            let product_id: String = row.try_get("product_id")?;
            let quantity = to_quantity(&product_id, "cart quantity", row.try_get("quantity")?)?;
            items.insert(ProductId::new(product_id), quantity);
        }

        Ok(Some(Cart { buyer_id, items }))
    }

    #[tracing::instrument(skip(self))]
    async fn clear(&self, buyer_id: BuyerId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1")
            .bind(buyer_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
