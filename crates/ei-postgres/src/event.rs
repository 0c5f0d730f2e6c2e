use async_trait::async_trait;
use ei_core::{ports::EventStore, types::*, Result};
use sqlx::PgPool;

use crate::internal;

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    message_id: String,
    status: String,
    event_name: Option<String>,
    event_date: Option<chrono::NaiveDate>,
    start_time: Option<chrono::NaiveTime>,
    end_time: Option<chrono::NaiveTime>,
    end_time_inferred: bool,
    timezone: Option<String>,
    event_type: Option<String>,
    calendar_ical_uid: Option<String>,
    calendar_event_id: Option<String>,
    prov_model: String,
    prov_prompt_version: String,
    prov_raw_output: String,
    error: Option<String>,
}

impl From<EventRow> for EventRecord {
    fn from(r: EventRow) -> Self {
        EventRecord {
            message_id: r.message_id,
            status: r.status.parse().unwrap_or(ExtractionStatus::Failed),
            event_name: r.event_name,
            event_date: r.event_date,
            start_time: r.start_time,
            end_time: r.end_time,
            end_time_inferred: r.end_time_inferred,
            timezone: r.timezone,
            // event_type is intentionally not validated here — legacy rows
            // may carry a value outside the current closed set.
            event_type: r.event_type.and_then(|s| s.parse().ok()),
            calendar_ical_uid: r.calendar_ical_uid,
            calendar_event_id: r.calendar_event_id,
            provenance: EventProvenance {
                model: r.prov_model,
                prompt_version: r.prov_prompt_version,
                raw_output: r.prov_raw_output,
            },
            error: r.error,
        }
    }
}

const COLUMNS: &str = "message_id, status, event_name, event_date, start_time, end_time, \
    end_time_inferred, timezone, event_type, calendar_ical_uid, calendar_event_id, \
    prov_model, prov_prompt_version, prov_raw_output, error";

#[async_trait]
impl EventStore for PgEventStore {
    async fn upsert(&self, record: &EventRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_records (
                message_id, status, event_name, event_date, start_time, end_time,
                end_time_inferred, timezone, event_type, calendar_ical_uid, calendar_event_id,
                prov_model, prov_prompt_version, prov_raw_output, error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (message_id) DO UPDATE SET
                status = EXCLUDED.status,
                event_name = EXCLUDED.event_name,
                event_date = EXCLUDED.event_date,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                end_time_inferred = EXCLUDED.end_time_inferred,
                timezone = EXCLUDED.timezone,
                event_type = EXCLUDED.event_type,
                calendar_ical_uid = EXCLUDED.calendar_ical_uid,
                calendar_event_id = EXCLUDED.calendar_event_id,
                prov_model = EXCLUDED.prov_model,
                prov_prompt_version = EXCLUDED.prov_prompt_version,
                prov_raw_output = EXCLUDED.prov_raw_output,
                error = EXCLUDED.error
            "#,
        )
        .bind(&record.message_id)
        .bind(record.status.to_string())
        .bind(&record.event_name)
        .bind(record.event_date)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.end_time_inferred)
        .bind(&record.timezone)
        .bind(record.event_type.map(|t| t.to_string()))
        .bind(&record.calendar_ical_uid)
        .bind(&record.calendar_event_id)
        .bind(&record.provenance.model)
        .bind(&record.provenance.prompt_version)
        .bind(&record.provenance.raw_output)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {COLUMNS} FROM event_records WHERE message_id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }
}
