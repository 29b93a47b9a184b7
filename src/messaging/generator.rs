use std::time::Duration;

use chrono::{SubsecRound, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use uuid::Uuid;

use crate::domain::order::{encode_order, Delivery, Item, Order, Payment};

// ============================================================================
// Order Generator
// ============================================================================
//
// Publishes randomized, valid order events keyed by `order_uid`, for driving
// the intake pipeline in development.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

const PRODUCTS: &[&str] = &["Mascaras", "Laptop", "Phone", "Headphones", "Keyboard", "Monitor", "Watch"];
const BRANDS: &[&str] = &["Vivienne Sabo", "BrandX", "BrandY", "Acme"];
const BANKS: &[&str] = &["alpha", "bankA", "bankB"];
const CITIES: &[&str] = &["Kiryat Mozkin", "Tel Aviv", "Haifa", "Jerusalem"];

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode order: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("kafka send error: {0}")]
    Kafka(#[from] KafkaError),
}

fn digits(rng: &mut impl Rng, n: usize) -> String {
    (0..n).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

fn pick<'a>(rng: &mut impl Rng, choices: &[&'a str]) -> &'a str {
    choices.choose(rng).copied().unwrap_or_default()
}

/// A random order with one item, consistent with `Order::validate`.
pub fn random_order(rng: &mut impl Rng) -> Order {
    let order_uid = Uuid::new_v4();
    let track_number = format!("WBILM{}TRACK", digits(rng, 6));
    let price: i64 = rng.gen_range(100..1000);
    let now = Utc::now().trunc_subsecs(0);

    Order {
        order_uid,
        track_number: track_number.clone(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: format!("+972{}", digits(rng, 7)),
            zip: digits(rng, 7),
            city: pick(rng, CITIES).to_string(),
            address: format!("Ploshad Mira {}", rng.gen_range(0..100)),
            region: "Kraiot".to_string(),
            email: format!("test+{}@gmail.com", digits(rng, 3)),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: price,
            payment_dt: now,
            bank: pick(rng, BANKS).to_string(),
            delivery_cost: 1500,
            goods_total: price,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: rng.gen_range(0..9_999_999),
            track_number,
            price,
            rid: Uuid::new_v4().to_string(),
            name: pick(rng, PRODUCTS).to_string(),
            sale: rng.gen_range(0..50),
            size: "0".to_string(),
            total_price: price,
            nm_id: rng.gen_range(0..9_999_999),
            brand: pick(rng, BRANDS).to_string(),
            status: rng.gen_range(200..210),
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: format!("test_customer_{}", digits(rng, 3)),
        delivery_service: "meest".to_string(),
        shardkey: rng.gen_range(0..10).to_string(),
        sm_id: rng.gen_range(0..200),
        date_created: now,
        oof_shard: "1".to_string(),
    }
}

pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OrderPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    pub async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let key = order.order_uid.to_string();
        let payload = encode_order(order)?;

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| e)?;

        tracing::info!(topic = %self.topic, order_uid = %key, "📤 Published order");
        Ok(())
    }
}
