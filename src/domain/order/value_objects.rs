use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::errors::ValidationError;

// ============================================================================
// Order Aggregate
// ============================================================================
//
// An Order owns exactly one Delivery, one Payment and an ordered list of
// Items. The serde shape is the wire shape of the inbound bus event and is
// reused verbatim for cache snapshots and HTTP responses.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: Uuid,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    #[serde(default)]
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    /// Truncated to microseconds, the precision PostgreSQL keeps.
    #[serde(deserialize_with = "microseconds")]
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Monetary amounts are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: Uuid,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub payment_dt: DateTime<Utc>,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Check the aggregate invariants that the type system does not enforce.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.is_nil() {
            return Err(ValidationError::EmptyOrderUid);
        }
        if self.payment.transaction.is_nil() {
            return Err(ValidationError::EmptyTransaction);
        }

        let payment = &self.payment;
        non_negative("payment.amount", payment.amount)?;
        non_negative("payment.delivery_cost", payment.delivery_cost)?;
        non_negative("payment.goods_total", payment.goods_total)?;
        non_negative("payment.custom_fee", payment.custom_fee)?;

        for item in &self.items {
            non_negative("items.price", item.price)?;
            non_negative("items.total_price", item.total_price)?;
        }

        Ok(())
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::NegativeAmount { field, value });
    }
    Ok(())
}

fn microseconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    Ok(DateTime::<Utc>::deserialize(deserializer)?.trunc_subsecs(6))
}

/// Parse a caller-supplied order identifier.
pub fn parse_order_uid(raw: &str) -> Result<Uuid, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::EmptyOrderUid);
    }

    let uid = Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidOrderUid(raw.to_string()))?;
    if uid.is_nil() {
        return Err(ValidationError::EmptyOrderUid);
    }

    Ok(uid)
}

// ============================================================================
// Unit Tests
// ============================================================================
