//! Postgres table schemas.
//!
//! - status columns are TEXT holding the lowercase enum names
//! - `distributions` is unique per (lead, customer) so a retried fan-out
//!   never creates a second row

pub const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id              UUID PRIMARY KEY,
    email           TEXT NOT NULL,
    name            TEXT NOT NULL,
    billing_id      TEXT NOT NULL UNIQUE,
    status          TEXT NOT NULL DEFAULT 'unpaid',
    last_payment_at TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id          UUID PRIMARY KEY,
    customer_id UUID NOT NULL REFERENCES customers (id),
    region_code TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',
    started_at  TIMESTAMPTZ NOT NULL,
    ended_at    TIMESTAMPTZ
)
"#;

pub const CREATE_SUBSCRIPTIONS_REGION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS subscriptions_region_idx
    ON subscriptions (region_code, status)
"#;

pub const CREATE_LEADS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS leads (
    id           UUID PRIMARY KEY,
    region_code  TEXT NOT NULL,
    source_ref   TEXT NOT NULL,
    source_url   TEXT,
    status       TEXT NOT NULL DEFAULT 'pending',
    created_at   TIMESTAMPTZ NOT NULL,
    processed_at TIMESTAMPTZ,
    payload      BYTEA NOT NULL
)
"#;

pub const CREATE_DISTRIBUTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS distributions (
    id            UUID PRIMARY KEY,
    lead_id       UUID NOT NULL REFERENCES leads (id),
    customer_id   UUID NOT NULL REFERENCES customers (id),
    scheduled_for TIMESTAMPTZ NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    sent_at       TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL,
    UNIQUE (lead_id, customer_id)
)
"#;

pub const CREATE_DISTRIBUTIONS_DUE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS distributions_due_idx
    ON distributions (status, scheduled_for)
"#;

/// All DDL statements in dependency order.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_CUSTOMERS_TABLE,
        CREATE_SUBSCRIPTIONS_TABLE,
        CREATE_SUBSCRIPTIONS_REGION_INDEX,
        CREATE_LEADS_TABLE,
        CREATE_DISTRIBUTIONS_TABLE,
        CREATE_DISTRIBUTIONS_DUE_INDEX,
    ]
}
