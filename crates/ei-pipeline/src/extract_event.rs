//! Event extraction (C11, spec §4.6). Asks the model for a JSON object
//! describing a ticketed/booked event, validates it strictly, and falls
//! back to extracting the first `{...}` region if the response carries
//! commentary around the JSON.

use chrono::{NaiveDate, NaiveTime};
use ei_core::{
    ports::EventStore,
    types::{EventProvenance, EventRecord, EventType, ExtractionStatus},
};
use ei_llm::GenerationModel;
use ei_provider::Provider;
use serde::Deserialize;

const MAX_BODY_CHARS: usize = 30_000;
const PROMPT_VERSION: &str = "event-v1";

const PROMPT_TEMPLATE: &str = r#"Does this email describe a single ticketed or booked event (a show, \
flight, reservation, appointment)? If yes, reply with ONLY a JSON object \
with these keys: event_name (string), event_date (YYYY-MM-DD), \
start_time (HH:MM, 24h), end_time (HH:MM, 24h, or null if unknown), \
timezone (IANA name or null), event_type (one of Theatre, Comedy, Opera, \
Ballet, Cinema, Social, Other). If no event is described, reply with \
exactly: {"event_name": null}

Email subject: {subject}
Email body:
{body}"#;

#[derive(Debug, Deserialize)]
struct RawEvent {
    event_name: Option<String>,
    event_date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    timezone: Option<String>,
    event_type: Option<String>,
}

pub async fn run(
    message_id: &str,
    subject: &str,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    events: &dyn EventStore,
) -> ei_core::Result<EventRecord> {
    let body = match provider.get_message_full(message_id).await {
        Ok(full) => {
            let mut text = full.body_text;
            text.truncate(MAX_BODY_CHARS);
            text
        }
        Err(_) => String::new(),
    };

    let prompt = PROMPT_TEMPLATE.replace("{subject}", subject).replace("{body}", &body);
    let response = generator.generate(&prompt).await?;

    let record = parse_and_validate(message_id, &response);
    events.upsert(&record).await?;
    Ok(record)
}

fn parse_and_validate(message_id: &str, response: &str) -> EventRecord {
    let provenance = |raw: &str| EventProvenance {
        model: "configured-generation-model".to_string(),
        prompt_version: PROMPT_VERSION.to_string(),
        raw_output: raw.to_string(),
    };

    let parsed: Option<RawEvent> = serde_json::from_str(response.trim())
        .ok()
        .or_else(|| extract_json_region(response).and_then(|region| serde_json::from_str(&region).ok()));

    let Some(raw) = parsed else {
        return failed_record(message_id, response, "response did not contain a parseable JSON object");
    };

    let Some(name) = raw.event_name else {
        return EventRecord {
            message_id: message_id.to_string(),
            status: ExtractionStatus::NoEvent,
            event_name: None,
            event_date: None,
            start_time: None,
            end_time: None,
            end_time_inferred: false,
            timezone: None,
            event_type: None,
            calendar_ical_uid: None,
            calendar_event_id: None,
            provenance: provenance(response),
            error: None,
        };
    };

    let event_date = raw.event_date.as_deref().and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let Some(event_date) = event_date else {
        return failed_record(message_id, response, "missing or invalid event_date");
    };

    let start_time = raw.start_time.as_deref().and_then(parse_time);
    let Some(start_time) = start_time else {
        return failed_record(message_id, response, "missing or invalid start_time");
    };

    let (end_time, end_time_inferred) = match raw.end_time.as_deref().and_then(parse_time) {
        Some(t) => (Some(t), false),
        None => (infer_end_time(start_time), true),
    };

    let event_type = raw.event_type.as_deref().map(normalize_event_type);

    EventRecord {
        message_id: message_id.to_string(),
        status: ExtractionStatus::Succeeded,
        event_name: Some(name),
        event_date: Some(event_date),
        start_time: Some(start_time),
        end_time,
        end_time_inferred,
        timezone: raw.timezone,
        event_type,
        calendar_ical_uid: None,
        calendar_event_id: None,
        provenance: provenance(response),
        error: None,
    }
}

fn failed_record(message_id: &str, response: &str, error: &str) -> EventRecord {
    EventRecord {
        message_id: message_id.to_string(),
        status: ExtractionStatus::Failed,
        event_name: None,
        event_date: None,
        start_time: None,
        end_time: None,
        end_time_inferred: false,
        timezone: None,
        event_type: None,
        calendar_ical_uid: None,
        calendar_event_id: None,
        provenance: EventProvenance {
            model: "configured-generation-model".to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            raw_output: response.to_string(),
        },
        error: Some(error.to_string()),
    }
}

fn extract_json_region(response: &str) -> Option<String> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(response[start..=end].to_string())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S").ok().or_else(|| NaiveTime::parse_from_str(raw, "%H:%M").ok())
}

/// A 2-hour duration is the closed-set default when the model omits
/// `end_time` (spec §4.6 step — end-time inference).
fn infer_end_time(start: NaiveTime) -> Option<NaiveTime> {
    start.overflowing_add_signed(chrono::Duration::hours(2)).0.into()
}

/// Maps legacy/free-text event-type strings onto the closed set (spec §4.6,
/// §9: older extractions used "Play" and "Movie").
fn normalize_event_type(raw: &str) -> EventType {
    match raw.trim().to_ascii_lowercase().as_str() {
        "theatre" | "theater" | "play" => EventType::Theatre,
        "comedy" | "stand-up" | "standup" => EventType::Comedy,
        "opera" => EventType::Opera,
        "ballet" | "dance" => EventType::Ballet,
        "cinema" | "movie" | "film" => EventType::Cinema,
        "social" | "party" | "gathering" => EventType::Social,
        _ => EventType::Other,
    }
}
