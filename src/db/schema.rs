use sqlx::PgPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_uid          UUID PRIMARY KEY,
    track_number       TEXT        NOT NULL,
    entry              TEXT        NOT NULL,
    locale             TEXT        NOT NULL,
    internal_signature TEXT        NOT NULL,
    customer_id        TEXT        NOT NULL,
    delivery_service   TEXT        NOT NULL,
    shardkey           TEXT        NOT NULL,
    sm_id              INTEGER     NOT NULL,
    date_created       TIMESTAMPTZ NOT NULL,
    oof_shard          TEXT        NOT NULL
);

CREATE INDEX IF NOT EXISTS orders_date_created_idx ON orders (date_created DESC);

CREATE TABLE IF NOT EXISTS delivery (
    order_uid UUID PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
    name      TEXT NOT NULL,
    phone     TEXT NOT NULL,
    zip       TEXT NOT NULL,
    city      TEXT NOT NULL,
    address   TEXT NOT NULL,
    region    TEXT NOT NULL,
    email     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payment (
    transaction   UUID PRIMARY KEY,
    order_uid     UUID        NOT NULL UNIQUE REFERENCES orders (order_uid) ON DELETE CASCADE,
    request_id    TEXT        NOT NULL,
    currency      TEXT        NOT NULL,
    provider      TEXT        NOT NULL,
    amount        BIGINT      NOT NULL CHECK (amount >= 0),
    payment_dt    TIMESTAMPTZ NOT NULL,
    bank          TEXT        NOT NULL,
    delivery_cost BIGINT      NOT NULL CHECK (delivery_cost >= 0),
    goods_total   BIGINT      NOT NULL CHECK (goods_total >= 0),
    custom_fee    BIGINT      NOT NULL CHECK (custom_fee >= 0)
);

CREATE TABLE IF NOT EXISTS items (
    order_uid    UUID    NOT NULL REFERENCES orders (order_uid) ON DELETE CASCADE,
    item_index   INTEGER NOT NULL,
    chrt_id      BIGINT  NOT NULL,
    track_number TEXT    NOT NULL,
    price        BIGINT  NOT NULL CHECK (price >= 0),
    rid          TEXT    NOT NULL,
    name         TEXT    NOT NULL,
    sale         INTEGER NOT NULL,
    size         TEXT    NOT NULL,
    total_price  BIGINT  NOT NULL CHECK (total_price >= 0),
    nm_id        BIGINT  NOT NULL,
    brand        TEXT    NOT NULL,
    status       INTEGER NOT NULL,
    PRIMARY KEY (order_uid, item_index)
);

CREATE TABLE IF NOT EXISTS inbox (
    message_id       TEXT PRIMARY KEY,
    topic            TEXT        NOT NULL,
    payload          BYTEA       NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
    processed        BOOLEAN     NOT NULL DEFAULT false,
    attempts         INTEGER     NOT NULL DEFAULT 0,
    last_error       TEXT,
    outcome          TEXT,
    lease_token      UUID,
    lease_expires_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS inbox_pending_idx ON inbox (created_at, message_id) WHERE NOT processed;

CREATE TABLE IF NOT EXISTS dead_letter_queue (
    id            UUID PRIMARY KEY,
    message_id    TEXT        NOT NULL,
    topic         TEXT        NOT NULL,
    payload       BYTEA       NOT NULL,
    reason        TEXT        NOT NULL,
    error_message TEXT        NOT NULL,
    failure_count INTEGER     NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL
);
"#;

/// Create every relation the service uses, if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("Database schema ensured");
    Ok(())
}
