use async_trait::async_trait;
use ei_core::{ports::PaymentStore, types::*, Result};
use sqlx::PgPool;

use crate::internal;

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    message_id: String,
    item: Option<String>,
    vendor: String,
    category: String,
    amount: String,
    currency: String,
    recurring: bool,
    frequency: Option<String>,
    payment_date: chrono::NaiveDate,
    fingerprint: String,
    prov_model: String,
    prov_prompt_version: String,
    prov_raw_output: String,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(r: PaymentRow) -> Self {
        PaymentRecord {
            message_id: r.message_id,
            item: r.item,
            vendor: r.vendor,
            category: r.category.parse().unwrap_or(PaymentCategory::Other),
            amount: r.amount,
            currency: r.currency,
            recurring: r.recurring,
            frequency: r.frequency.and_then(|s| s.parse().ok()),
            payment_date: r.payment_date,
            fingerprint: r.fingerprint,
            provenance: EventProvenance {
                model: r.prov_model,
                prompt_version: r.prov_prompt_version,
                raw_output: r.prov_raw_output,
            },
        }
    }
}

const COLUMNS: &str = "message_id, item, vendor, category, amount, currency, recurring, \
    frequency, payment_date, fingerprint, prov_model, prov_prompt_version, prov_raw_output";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn upsert(&self, record: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_records (
                message_id, item, vendor, category, amount, currency, recurring,
                frequency, payment_date, fingerprint, prov_model, prov_prompt_version, prov_raw_output
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (message_id) DO UPDATE SET
                item = EXCLUDED.item,
                vendor = EXCLUDED.vendor,
                category = EXCLUDED.category,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                recurring = EXCLUDED.recurring,
                frequency = EXCLUDED.frequency,
                payment_date = EXCLUDED.payment_date,
                fingerprint = EXCLUDED.fingerprint,
                prov_model = EXCLUDED.prov_model,
                prov_prompt_version = EXCLUDED.prov_prompt_version,
                prov_raw_output = EXCLUDED.prov_raw_output
            "#,
        )
        .bind(&record.message_id)
        .bind(&record.item)
        .bind(&record.vendor)
        .bind(record.category.to_string())
        .bind(&record.amount)
        .bind(&record.currency)
        .bind(record.recurring)
        .bind(record.frequency.map(|f| f.to_string()))
        .bind(record.payment_date)
        .bind(&record.fingerprint)
        .bind(&record.provenance.model)
        .bind(&record.provenance.prompt_version)
        .bind(&record.provenance.raw_output)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {COLUMNS} FROM payment_records WHERE message_id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }

    async fn exists_with_fingerprint(&self, fingerprint: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM payment_records WHERE fingerprint = $1 LIMIT 1")
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;
        Ok(row.is_some())
    }
}
