//! Payment extraction (C11, spec §4.6/§4.7). Dedups on the normalized
//! `vendor|amount|currency|date` fingerprint before persisting — a payment
//! already seen with an identical fingerprint is not re-upserted, since a
//! forwarded or re-synced copy of the same receipt email would otherwise
//! double-count.

use chrono::NaiveDate;
use ei_core::{
    fingerprint::{parse_amount, payment_fingerprint},
    ports::PaymentStore,
    types::{EventProvenance, PaymentCategory, PaymentFrequency, PaymentRecord},
};
use ei_llm::GenerationModel;
use ei_provider::Provider;
use serde::Deserialize;

const MAX_BODY_CHARS: usize = 30_000;
const PROMPT_VERSION: &str = "payment-v1";

const PROMPT_TEMPLATE: &str = r#"Does this email confirm a payment, invoice, or bill (a receipt, \
subscription charge, utility bill, rent, insurance premium, loan payment)? \
If yes, reply with ONLY a JSON object with these keys: item (string or \
null), vendor (string), amount (string, may include currency symbol), \
currency (ISO 4217 code or null), category (one of Subscription, Utility, \
Rent, Insurance, Loan, Shopping, Travel, Other), recurring (boolean), \
frequency (one of Weekly, Monthly, Quarterly, Yearly, or null), \
payment_date (YYYY-MM-DD). If no payment is described, reply with exactly: \
{"vendor": null}

Email subject: {subject}
Email body:
{body}"#;

#[derive(Debug, Deserialize)]
struct RawPayment {
    item: Option<String>,
    vendor: Option<String>,
    amount: Option<String>,
    currency: Option<String>,
    category: Option<String>,
    recurring: Option<bool>,
    frequency: Option<String>,
    payment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Persisted(PaymentRecord),
    Duplicate(String),
    NoPayment,
    Failed(String),
}

pub async fn run(
    message_id: &str,
    subject: &str,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    payments: &dyn PaymentStore,
) -> ei_core::Result<ExtractOutcome> {
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

    let outcome = parse_and_validate(message_id, &response);
    if let ExtractOutcome::Persisted(record) = &outcome {
        if payments.exists_with_fingerprint(&record.fingerprint).await? {
            return Ok(ExtractOutcome::Duplicate(record.fingerprint.clone()));
        }
        payments.upsert(record).await?;
    }
    Ok(outcome)
}

fn parse_and_validate(message_id: &str, response: &str) -> ExtractOutcome {
    let parsed: Option<RawPayment> = serde_json::from_str(response.trim())
        .ok()
        .or_else(|| extract_json_region(response).and_then(|region| serde_json::from_str(&region).ok()));

    let Some(raw) = parsed else {
        return ExtractOutcome::Failed("response did not contain a parseable JSON object".to_string());
    };

    let Some(vendor) = raw.vendor else {
        return ExtractOutcome::NoPayment;
    };

    let Some((amount, parsed_currency)) = raw.amount.as_deref().and_then(parse_amount) else {
        return ExtractOutcome::Failed("missing or unparseable amount".to_string());
    };
    let currency = raw.currency.or(parsed_currency).unwrap_or_else(|| "UNKNOWN".to_string());

    let Some(payment_date) =
        raw.payment_date.as_deref().and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    else {
        return ExtractOutcome::Failed("missing or invalid payment_date".to_string());
    };

    let category = raw.category.as_deref().map(normalize_category).unwrap_or(PaymentCategory::Other);
    let frequency = raw.frequency.as_deref().and_then(normalize_frequency);
    let recurring = raw.recurring.unwrap_or(frequency.is_some());

    let fingerprint = payment_fingerprint(&vendor, &amount, &currency, payment_date);

    ExtractOutcome::Persisted(PaymentRecord {
        message_id: message_id.to_string(),
        item: raw.item,
        vendor,
        category,
        amount,
        currency,
        recurring,
        frequency,
        payment_date,
        fingerprint,
        provenance: EventProvenance {
            model: "configured-generation-model".to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            raw_output: response.to_string(),
        },
    })
}

fn extract_json_region(response: &str) -> Option<String> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(response[start..=end].to_string())
}

fn normalize_category(raw: &str) -> PaymentCategory {
    match raw.trim().to_ascii_lowercase().as_str() {
        "subscription" => PaymentCategory::Subscription,
        "utility" | "utilities" => PaymentCategory::Utility,
        "rent" => PaymentCategory::Rent,
        "insurance" => PaymentCategory::Insurance,
        "loan" | "mortgage" => PaymentCategory::Loan,
        "shopping" | "retail" => PaymentCategory::Shopping,
        "travel" => PaymentCategory::Travel,
        _ => PaymentCategory::Other,
    }
}

fn normalize_frequency(raw: &str) -> Option<PaymentFrequency> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "weekly" => Some(PaymentFrequency::Weekly),
        "monthly" => Some(PaymentFrequency::Monthly),
        "quarterly" => Some(PaymentFrequency::Quarterly),
        "yearly" | "annual" | "annually" => Some(PaymentFrequency::Yearly),
        _ => None,
    }
}
