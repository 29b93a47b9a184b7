use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::application::{
    CacheError, CacheLookup, DeadLetter, DeadLetterStore, InboxStore, OrderCache, OrdersRepository,
    ProcessingOutcome, StagedMessage, StoreError,
};
use crate::domain::order::{Delivery, Item, Order, Payment};

// ============================================================================
// Test Fixtures & In-Memory Adapters
// ============================================================================

fn fixed_time(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

pub fn sample_order(order_uid: Uuid, items: usize) -> Order {
    Order {
        order_uid,
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: Uuid::new_v4(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: fixed_time(1_637_907_727),
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: (0..items)
            .map(|i| Item {
                chrt_id: 9_934_930 + i as i64,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: format!("ab4219087a764ae0btest{i}"),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            })
            .collect(),
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: fixed_time(1_637_907_739),
        oof_shard: "1".to_string(),
    }
}

/// An inbound event as it arrives on the bus, with one item priced `price`.
pub fn sample_payload(order_uid: &str, price: i64) -> String {
    serde_json::json!({
        "order_uid": order_uid,
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7-b2b8-4b6b-8f1c-2b7c1e2f3a4d",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": price,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 0,
            "size": "0",
            "total_price": price,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    })
    .to_string()
}

fn outage() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

// ----------------------------------------------------------------------------
// Inbox
// ----------------------------------------------------------------------------

struct InboxRow {
    message: StagedMessage,
    outcome: Option<ProcessingOutcome>,
    last_error: Option<String>,
    leased_until: Option<Instant>,
}

impl InboxRow {
    fn holds(&self, message: &StagedMessage) -> bool {
        self.message.key == message.key && !self.message.processed && self.message.lease_token == message.lease_token
    }
}

#[derive(Default)]
pub struct InMemoryInbox {
    rows: Mutex<Vec<InboxRow>>,
    unavailable: AtomicBool,
    append_failure: Mutex<Option<fn() -> StoreError>>,
}

impl InMemoryInbox {
    /// Fail every `append` with `error` until cleared.
    pub fn fail_appends(&self, error: Option<fn() -> StoreError>) {
        *self.append_failure.lock().unwrap() = error;
    }

    /// Hand every live lease to another holder, as if each had expired and
    /// been re-claimed elsewhere.
    pub fn steal_leases(&self) {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut().filter(|row| row.message.lease_token.is_some()) {
            row.message.lease_token = Some(Uuid::new_v4());
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn outcome(&self, key: &str) -> Option<ProcessingOutcome> {
        self.with_row(key, |row| row.outcome)
    }

    pub fn attempts(&self, key: &str) -> i32 {
        self.with_row(key, |row| Some(row.message.attempts)).unwrap_or(0)
    }

    pub fn last_error(&self, key: &str) -> Option<String> {
        self.with_row(key, |row| row.last_error.clone())
    }

    fn with_row<T>(&self, key: &str, f: impl FnOnce(&InboxRow) -> Option<T>) -> Option<T> {
        let rows = self.rows.lock().unwrap();
        rows.iter().find(|row| row.message.key == key).and_then(f)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(outage());
        }
        Ok(())
    }
}

#[async_trait]
impl InboxStore for InMemoryInbox {
    async fn append(&self, key: &str, topic: &str, payload: &[u8]) -> Result<bool, StoreError> {
        self.check()?;
        if let Some(error) = *self.append_failure.lock().unwrap() {
            return Err(error());
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|row| row.message.key == key) {
            return Ok(false);
        }
        rows.push(InboxRow {
            message: StagedMessage {
                key: key.to_string(),
                topic: topic.to_string(),
                payload: payload.to_vec(),
                created_at: Utc::now(),
                processed: false,
                attempts: 0,
                lease_token: None,
            },
            outcome: None,
            last_error: None,
            leased_until: None,
        });
        Ok(true)
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<StagedMessage>, StoreError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| !row.message.processed)
            .take(limit.max(0) as usize)
            .map(|row| row.message.clone())
            .collect())
    }

    async fn claim_unprocessed(&self, limit: i64, lease: Duration) -> Result<Vec<StagedMessage>, StoreError> {
        self.check()?;
        let now = Instant::now();
        let token = Uuid::new_v4();
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .filter(|row| !row.message.processed && row.leased_until.map_or(true, |until| until <= now))
            .take(limit.max(0) as usize)
            .map(|row| {
                row.leased_until = Some(now + lease);
                row.message.lease_token = Some(token);
                row.message.clone()
            })
            .collect())
    }

    async fn mark_processed(&self, message: &StagedMessage, outcome: ProcessingOutcome) -> Result<bool, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|row| row.holds(message)) else {
            return Ok(false);
        };
        row.message.processed = true;
        row.message.lease_token = None;
        row.outcome = Some(outcome);
        row.leased_until = None;
        Ok(true)
    }

    async fn record_failure(&self, message: &StagedMessage, error: &str) -> Result<Option<i32>, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|row| row.holds(message)) else {
            return Ok(None);
        };
        row.message.attempts += 1;
        row.message.lease_token = None;
        row.last_error = Some(error.to_string());
        row.leased_until = None;
        Ok(Some(row.message.attempts))
    }
}

// ----------------------------------------------------------------------------
// Orders
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrders {
    orders: Mutex<HashMap<Uuid, Order>>,
    get_calls: AtomicUsize,
    unavailable: AtomicBool,
    next_store_failure: Mutex<Option<fn() -> StoreError>>,
    store_failure: Mutex<Option<fn() -> StoreError>>,
}

impl InMemoryOrders {
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    /// Make `get` and `recent` fail with a pool timeout.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `store` call only.
    pub fn fail_next_store(&self, error: fn() -> StoreError) {
        *self.next_store_failure.lock().unwrap() = Some(error);
    }

    /// Fail every `store` call until cleared.
    pub fn fail_stores(&self, error: Option<fn() -> StoreError>) {
        *self.store_failure.lock().unwrap() = error;
    }
}

#[async_trait]
impl OrdersRepository for InMemoryOrders {
    async fn get(&self, order_uid: &Uuid) -> Result<Option<Order>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(outage());
        }
        Ok(self.orders.lock().unwrap().get(order_uid).cloned())
    }

    async fn store(&self, order: &Order) -> Result<(), StoreError> {
        if let Some(error) = self.next_store_failure.lock().unwrap().take() {
            return Err(error());
        }
        if let Some(error) = *self.store_failure.lock().unwrap() {
            return Err(error());
        }
        let mut orders = self.orders.lock().unwrap();
        if orders.contains_key(&order.order_uid) {
            return Err(StoreError::DuplicateOrder(order.order_uid));
        }
        orders.insert(order.order_uid, order.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(outage());
        }
        let mut orders: Vec<Order> = self.orders.lock().unwrap().values().cloned().collect();
        orders.sort_by(|a, b| {
            b.date_created
                .cmp(&a.date_created)
                .then_with(|| a.order_uid.cmp(&b.order_uid))
        });
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }
}

// ----------------------------------------------------------------------------
// Cache
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<Uuid, String>>,
    unavailable: AtomicBool,
}

impl InMemoryCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn contains(&self, order_uid: &Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(order_uid)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderCache for InMemoryCache {
    async fn cache(&self, order: &Order) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        let snapshot = serde_json::to_string(order)?;
        self.entries.lock().unwrap().insert(order.order_uid, snapshot);
        Ok(())
    }

    async fn get_order_from_cache(&self, order_uid: &Uuid) -> CacheLookup {
        if self.unavailable.load(Ordering::SeqCst) {
            return CacheLookup::Failed(CacheError::Unavailable);
        }
        let snapshot = self.entries.lock().unwrap().get(order_uid).cloned();
        match snapshot {
            None => CacheLookup::Miss,
            Some(json) => match serde_json::from_str(&json) {
                Ok(order) => CacheLookup::Hit(order),
                Err(e) => CacheLookup::Failed(e.into()),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Dead letters
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
    unavailable: AtomicBool,
}

impl InMemoryDeadLetters {
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetters {
    async fn insert(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(outage());
        }
        self.letters.lock().unwrap().push(letter.clone());
        Ok(())
    }
}
