//! Postgres-backed [`Store`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use router_core::{
    Customer, CustomerStatus, Distribution, DistributionStatus, DueDistribution, Error, Lead,
    LeadStatus, NewCustomer, NewLead, RegionCode, Result, Subscription,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::client::db_err;
use crate::store::Store;

const LEAD_COLUMNS: &str =
    "id, region_code, source_ref, source_url, status, created_at, processed_at, payload";
const CUSTOMER_COLUMNS: &str = "id, email, name, billing_id, status, last_payment_at, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, customer_id, region_code, status, started_at, ended_at";
const DISTRIBUTION_COLUMNS: &str =
    "id, lead_id, customer_id, scheduled_for, status, sent_at, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(Error::internal)
}

fn lead_from_row(row: &PgRow) -> Result<Lead> {
    let region: String = row.try_get("region_code").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let payload: Vec<u8> = row.try_get("payload").map_err(db_err)?;
    Ok(Lead {
        id: row.try_get("id").map_err(db_err)?,
        region_code: RegionCode::new(region)?,
        source_ref: row.try_get("source_ref").map_err(db_err)?,
        source_url: row.try_get("source_url").map_err(db_err)?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        processed_at: row.try_get("processed_at").map_err(db_err)?,
        payload: Bytes::from(payload),
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Customer {
        id: row.try_get("id").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        billing_id: row.try_get("billing_id").map_err(db_err)?,
        status: parse_status(&status)?,
        last_payment_at: row.try_get("last_payment_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let region: String = row.try_get("region_code").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Subscription {
        id: row.try_get("id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        region_code: RegionCode::new(region)?,
        status: parse_status(&status)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        ended_at: row.try_get("ended_at").map_err(db_err)?,
    })
}

fn distribution_from_row(row: &PgRow) -> Result<Distribution> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Distribution {
        id: row.try_get("id").map_err(db_err)?,
        lead_id: row.try_get("lead_id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        scheduled_for: row.try_get("scheduled_for").map_err(db_err)?,
        status: parse_status(&status)?,
        sent_at: row.try_get("sent_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn insert_lead(&self, lead: NewLead, now: DateTime<Utc>) -> Result<Lead> {
        let lead = lead.into_lead(Uuid::new_v4(), now);
        sqlx::query(&format!(
            "INSERT INTO leads ({LEAD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(lead.id)
        .bind(lead.region_code.as_str())
        .bind(&lead.source_ref)
        .bind(&lead.source_url)
        .bind(lead.status.as_str())
        .bind(lead.created_at)
        .bind(lead.processed_at)
        .bind(lead.payload.as_ref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(lead)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn finalize_lead(
        &self,
        id: Uuid,
        status: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE leads SET status = $2, processed_at = $3 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn eligible_subscribers(&self, region: &RegionCode) -> Result<Vec<Customer>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.email, c.name, c.billing_id, c.status, c.last_payment_at, c.created_at
            FROM customers c
            WHERE c.status = 'paid'
              AND EXISTS (
                  SELECT 1 FROM subscriptions s
                  WHERE s.customer_id = c.id
                    AND s.region_code = $1
                    AND s.status = 'active'
              )
            ORDER BY c.created_at
            "#,
        )
        .bind(region.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn paid_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE status = 'paid' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_customer_by_billing_id(&self, billing_id: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE billing_id = $1"
        ))
        .bind(billing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn insert_customer(&self, customer: NewCustomer, now: DateTime<Utc>) -> Result<Customer> {
        let row = sqlx::query(&format!(
            "INSERT INTO customers (id, email, name, billing_id, status, created_at) \
             VALUES ($1, $2, $3, $4, 'unpaid', $5) RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.billing_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        customer_from_row(&row)
    }

    async fn set_customer_status(&self, id: Uuid, status: CustomerStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE customers SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_customer_status_by_billing_id(
        &self,
        billing_id: &str,
        status: CustomerStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "UPDATE customers SET status = $2, last_payment_at = COALESCE($3, last_payment_at) \
             WHERE billing_id = $1 RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(billing_id)
        .bind(status.as_str())
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn insert_subscription(
        &self,
        customer_id: Uuid,
        region: RegionCode,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let row = sqlx::query(&format!(
            "INSERT INTO subscriptions (id, customer_id, region_code, status, started_at) \
             VALUES ($1, $2, $3, 'active', $4) RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(region.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        subscription_from_row(&row)
    }

    async fn list_subscriptions(&self, customer_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE customer_id = $1 \
             ORDER BY started_at"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn cancel_subscriptions(&self, customer_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'cancelled', ended_at = $2 \
             WHERE customer_id = $1 AND status = 'active'",
        )
        .bind(customer_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn ensure_distribution(
        &self,
        lead_id: Uuid,
        customer_id: Uuid,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Distribution, bool)> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO distributions (id, lead_id, customer_id, scheduled_for, status, created_at) \
             VALUES ($1, $2, $3, $4, 'pending', $5) \
             ON CONFLICT (lead_id, customer_id) DO NOTHING \
             RETURNING {DISTRIBUTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(lead_id)
        .bind(customer_id)
        .bind(scheduled_for)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return Ok((distribution_from_row(&row)?, true));
        }

        let existing = sqlx::query(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM distributions WHERE lead_id = $1 AND customer_id = $2"
        ))
        .bind(lead_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok((distribution_from_row(&existing)?, false))
    }

    async fn due_distributions(&self, now: DateTime<Utc>) -> Result<Vec<DueDistribution>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.lead_id, d.customer_id, d.scheduled_for, d.status, d.sent_at,
                   d.created_at, l.region_code, l.payload, c.email, c.billing_id
            FROM distributions d
            JOIN leads l ON l.id = d.lead_id
            JOIN customers c ON c.id = d.customer_id
            WHERE d.status = 'pending' AND d.scheduled_for <= $1
              AND l.status = 'scheduled'
            ORDER BY d.scheduled_for
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let region: String = row.try_get("region_code").map_err(db_err)?;
                let payload: Vec<u8> = row.try_get("payload").map_err(db_err)?;
                Ok(DueDistribution {
                    distribution: distribution_from_row(row)?,
                    region_code: RegionCode::new(region)?,
                    payload: Bytes::from(payload),
                    email: row.try_get("email").map_err(db_err)?,
                    billing_id: row.try_get("billing_id").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn finalize_distribution(
        &self,
        id: Uuid,
        status: DistributionStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE distributions SET status = $2, sent_at = $3 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_distribution(&self, id: Uuid) -> Result<Option<Distribution>> {
        let row = sqlx::query(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM distributions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(distribution_from_row).transpose()
    }

    async fn distributions_for_lead(&self, lead_id: Uuid) -> Result<Vec<Distribution>> {
        let rows = sqlx::query(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM distributions WHERE lead_id = $1 ORDER BY created_at"
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(distribution_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
