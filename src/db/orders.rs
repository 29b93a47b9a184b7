use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::application::{OrdersRepository, StoreError};
use crate::domain::order::{Delivery, Item, Order, Payment};

// ============================================================================
// Orders Repository - order aggregate over four relations
// ============================================================================
//
// orders (header) 1 ── 1 delivery
//                 1 ── 1 payment   (keyed by its own transaction id)
//                 1 ── n items     (item_index keeps display order)
//
// Writes insert every relation in one transaction; any failure drops the
// transaction, which rolls the whole aggregate back. Reads load every
// relation inside one REPEATABLE READ transaction so they see one snapshot.
//
// ============================================================================

pub struct PgOrdersRepository {
    pool: PgPool,
}

impl PgOrdersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: Uuid,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    order_uid: Uuid,
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    order_uid: Uuid,
    transaction: Uuid,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: DateTime<Utc>,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_uid: Uuid,
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i32,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

/// Load full aggregates for `uids`, preserving the order of `uids`.
/// Unknown uids are skipped.
async fn load_aggregates(conn: &mut PgConnection, uids: &[Uuid]) -> Result<Vec<Order>, StoreError> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }

    let headers: Vec<OrderRow> = sqlx::query_as(
        r#"
        SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
               delivery_service, shardkey, sm_id, date_created, oof_shard
        FROM orders
        WHERE order_uid = ANY($1)
        "#,
    )
    .bind(uids)
    .fetch_all(&mut *conn)
    .await?;

    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut deliveries: HashMap<Uuid, DeliveryRow> = sqlx::query_as::<_, DeliveryRow>(
        r#"
        SELECT order_uid, name, phone, zip, city, address, region, email
        FROM delivery
        WHERE order_uid = ANY($1)
        "#,
    )
    .bind(uids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| (row.order_uid, row))
    .collect();

    let mut payments: HashMap<Uuid, PaymentRow> = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT order_uid, transaction, request_id, currency, provider, amount,
               payment_dt, bank, delivery_cost, goods_total, custom_fee
        FROM payment
        WHERE order_uid = ANY($1)
        "#,
    )
    .bind(uids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| (row.order_uid, row))
    .collect();

    let item_rows: Vec<ItemRow> = sqlx::query_as(
        r#"
        SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size,
               total_price, nm_id, brand, status
        FROM items
        WHERE order_uid = ANY($1)
        ORDER BY order_uid, item_index
        "#,
    )
    .bind(uids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<Uuid, Vec<Item>> = HashMap::new();
    for row in item_rows {
        items.entry(row.order_uid).or_default().push(row.into());
    }

    let mut headers: HashMap<Uuid, OrderRow> = headers.into_iter().map(|row| (row.order_uid, row)).collect();

    let mut orders = Vec::with_capacity(headers.len());
    for uid in uids {
        let Some(header) = headers.remove(uid) else {
            continue;
        };

        let delivery = deliveries.remove(uid).ok_or(StoreError::MissingRelation {
            order_uid: *uid,
            relation: "delivery",
        })?;
        let payment = payments.remove(uid).ok_or(StoreError::MissingRelation {
            order_uid: *uid,
            relation: "payment",
        })?;

        orders.push(Order {
            order_uid: header.order_uid,
            track_number: header.track_number,
            entry: header.entry,
            delivery: delivery.into(),
            payment: payment.into(),
            items: items.remove(uid).unwrap_or_default(),
            locale: header.locale,
            internal_signature: header.internal_signature,
            customer_id: header.customer_id,
            delivery_service: header.delivery_service,
            shardkey: header.shardkey,
            sm_id: header.sm_id,
            date_created: header.date_created,
            oof_shard: header.oof_shard,
        });
    }

    Ok(orders)
}

async fn begin_snapshot_read(pool: &PgPool) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

fn insert_error(err: sqlx::Error, order_uid: Uuid) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() && db.constraint() == Some("orders_pkey") {
            return StoreError::DuplicateOrder(order_uid);
        }
    }
    StoreError::Database(err)
}

async fn insert_aggregate(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature,
            customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut *conn)
    .await?;

    let delivery = &order.delivery;
    sqlx::query(
        r#"
        INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order.order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut *conn)
    .await?;

    let payment = &order.payment;
    sqlx::query(
        r#"
        INSERT INTO payment (
            transaction, order_uid, request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(payment.transaction)
    .bind(order.order_uid)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut *conn)
    .await?;

    for (index, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO items (
                order_uid, item_index, chrt_id, track_number, price, rid, name,
                sale, size, total_price, nm_id, brand, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.order_uid)
        .bind(index as i32)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn get(&self, order_uid: &Uuid) -> Result<Option<Order>, StoreError> {
        let mut tx = begin_snapshot_read(&self.pool).await?;
        let mut orders = load_aggregates(&mut tx, std::slice::from_ref(order_uid)).await?;
        tx.commit().await?;

        Ok(orders.pop())
    }

    async fn store(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` on the error path rolls the whole aggregate back.
        insert_aggregate(&mut tx, order)
            .await
            .map_err(|e| insert_error(e, order.order_uid))?;

        tx.commit().await?;

        tracing::info!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "✅ Order aggregate committed"
        );
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        let mut tx = begin_snapshot_read(&self.pool).await?;

        let uids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT order_uid FROM orders ORDER BY date_created DESC, order_uid LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let orders = load_aggregates(&mut tx, &uids).await?;
        tx.commit().await?;

        Ok(orders)
    }
}

// ============================================================================
// Integration Tests (require PostgreSQL, run with `--ignored`)
// ============================================================================
