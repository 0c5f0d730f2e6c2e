//! Optional calendar publish step (SPEC_FULL §6). `CalendarClient` is a
//! port, not a concrete HTTP client, so `ei-pipeline` never depends on a
//! calendar SDK directly. Disabled by default — event extraction still
//! upserts the `EventRecord` when publish is skipped, since the calendar
//! entry is a side effect of a successfully extracted event, not a
//! precondition for recording one.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use ei_core::{
    ports::EventStore,
    types::{EventRecord, ExtractionStatus},
};
use uuid::Uuid;

/// Namespace for deriving deterministic iCalUIDs from a message id, so
/// re-running publish for the same event never creates a duplicate
/// calendar entry.
const ICAL_UID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x3c, 0x9a, 0x12, 0x4e, 0x77, 0x4b, 0x0a, 0x9f, 0x21, 0x8d, 0x5e, 0x02, 0xaa, 0x77, 0x31,
]);

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEventDraft {
    pub ical_uid: String,
    pub summary: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: Option<String>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Returns `Some(event_id)` if an event with this `ical_uid` already
    /// exists on the calendar.
    async fn find_by_ical_uid(&self, ical_uid: &str) -> ei_core::Result<Option<String>>;
    async fn insert(&self, draft: &CalendarEventDraft) -> ei_core::Result<String>;
}

pub fn ical_uid_for(message_id: &str) -> String {
    Uuid::new_v5(&ICAL_UID_NAMESPACE, message_id.as_bytes()).to_string()
}

/// Publishes a successfully-extracted event to the calendar, skipping
/// records that failed extraction, had no event, or are missing the
/// start/end times required to build a draft. Idempotent: a prior
/// publish with the same `ical_uid` is found and reused rather than
/// duplicated.
pub async fn publish(
    record: &EventRecord,
    calendar: &dyn CalendarClient,
    events: &dyn EventStore,
) -> ei_core::Result<Option<String>> {
    if record.status != ExtractionStatus::Succeeded {
        return Ok(None);
    }
    let (Some(name), Some(date), Some(start), Some(end)) =
        (&record.event_name, record.event_date, record.start_time, record.end_time)
    else {
        return Ok(None);
    };

    let ical_uid = ical_uid_for(&record.message_id);
    let event_id = match calendar.find_by_ical_uid(&ical_uid).await? {
        Some(existing) => existing,
        None => {
            let draft = CalendarEventDraft {
                ical_uid: ical_uid.clone(),
                summary: name.clone(),
                date,
                start_time: start,
                end_time: end,
                timezone: record.timezone.clone(),
            };
            calendar.insert(&draft).await?
        }
    };

    let mut updated = record.clone();
    updated.calendar_ical_uid = Some(ical_uid);
    updated.calendar_event_id = Some(event_id.clone());
    events.upsert(&updated).await?;

    Ok(Some(event_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ei_core::types::EventProvenance;
    use ei_core::types::EventType;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEvents {
        rows: Mutex<HashMap<String, EventRecord>>,
    }

    #[async_trait]
    impl EventStore for FakeEvents {
        async fn upsert(&self, record: &EventRecord) -> ei_core::Result<()> {
            self.rows.lock().unwrap().insert(record.message_id.clone(), record.clone());
            Ok(())
        }
        async fn get(&self, message_id: &str) -> ei_core::Result<Option<EventRecord>> {
            Ok(self.rows.lock().unwrap().get(message_id).cloned())
        }
    }

    struct FakeCalendar {
        existing: Mutex<HashMap<String, String>>,
        insert_calls: Mutex<u32>,
    }

    #[async_trait]
    impl CalendarClient for FakeCalendar {
        async fn find_by_ical_uid(&self, ical_uid: &str) -> ei_core::Result<Option<String>> {
            Ok(self.existing.lock().unwrap().get(ical_uid).cloned())
        }
        async fn insert(&self, draft: &CalendarEventDraft) -> ei_core::Result<String> {
            *self.insert_calls.lock().unwrap() += 1;
            let id = format!("evt-{}", draft.ical_uid);
            self.existing.lock().unwrap().insert(draft.ical_uid.clone(), id.clone());
            Ok(id)
        }
    }

    fn succeeded_record(message_id: &str) -> EventRecord {
        EventRecord {
            message_id: message_id.to_string(),
            status: ExtractionStatus::Succeeded,
            event_name: Some("Hamlet".to_string()),
            event_date: Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()),
            start_time: Some(NaiveTime::from_hms_opt(19, 30, 0).unwrap()),
            end_time: Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
            end_time_inferred: false,
            timezone: Some("Europe/London".to_string()),
            event_type: Some(EventType::Theatre),
            calendar_ical_uid: None,
            calendar_event_id: None,
            provenance: EventProvenance {
                model: "m".to_string(),
                prompt_version: "event-v1".to_string(),
                raw_output: "{}".to_string(),
            },
            error: None,
        }
    }

    #[tokio::test]
    async fn publishes_succeeded_event_and_stamps_calendar_ids() {
        let record = succeeded_record("m1");
        let calendar = FakeCalendar { existing: Mutex::new(HashMap::new()), insert_calls: Mutex::new(0) };
        let events = FakeEvents { rows: Mutex::new(HashMap::new()) };

        let event_id = publish(&record, &calendar, &events).await.unwrap();
        assert!(event_id.is_some());
        assert_eq!(*calendar.insert_calls.lock().unwrap(), 1);
        let stored = events.rows.lock().unwrap()["m1"].clone();
        assert!(stored.calendar_event_id.is_some());
    }

    #[tokio::test]
    async fn republishing_reuses_existing_ical_uid_without_duplicate_insert() {
        let record = succeeded_record("m1");
        let calendar = FakeCalendar { existing: Mutex::new(HashMap::new()), insert_calls: Mutex::new(0) };
        let events = FakeEvents { rows: Mutex::new(HashMap::new()) };

        publish(&record, &calendar, &events).await.unwrap();
        publish(&record, &calendar, &events).await.unwrap();

        assert_eq!(*calendar.insert_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn skips_publish_for_non_succeeded_records() {
        let mut record = succeeded_record("m2");
        record.status = ExtractionStatus::NoEvent;
        let calendar = FakeCalendar { existing: Mutex::new(HashMap::new()), insert_calls: Mutex::new(0) };
        let events = FakeEvents { rows: Mutex::new(HashMap::new()) };

        let result = publish(&record, &calendar, &events).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(*calendar.insert_calls.lock().unwrap(), 0);
    }
}
