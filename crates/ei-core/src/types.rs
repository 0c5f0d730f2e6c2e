//! Core domain types. Pure value types — no sqlx, no DB dependencies.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ── Message ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable provider id (e.g. Gmail message id). Not a uuid.
    pub provider_id: String,
    pub thread_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_unread: bool,
    /// Provider-side label ids as of the last ingest/trash-sync.
    pub provider_labels: Vec<String>,
    pub from_address: String,
    pub from_domain: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub subject_raw: String,
    pub subject_normalized: String,

    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub labeler_version: Option<String>,
    pub cluster_id: Option<Uuid>,
    pub archived_at: Option<DateTime<Utc>>,
    pub trashed_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_labelled(&self) -> bool {
        self.category.is_some()
    }
}

// ── Cluster ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: Uuid,
    pub seed_message_id: String,
    pub similarity_threshold: f64,
    pub labeler_version: String,
    pub frequency: Option<Frequency>,
    pub unread_ratio: Option<UnreadRatio>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnreadRatio {
    All,
    AlmostAll,
    Some,
    AlmostNone,
    None,
}

// ── Taxonomy ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyLevel {
    Tier1 = 1,
    Tier2 = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyLabel {
    pub level: TaxonomyLevel,
    /// Unique. Tier-2 slugs are namespaced: `slugify(parent) || "--" || slugify(child)`.
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_slug: Option<String>,
    pub retention_days: Option<i32>,
    pub active: bool,
    pub provider_label_id: Option<String>,
    pub last_sync_status: Option<String>,
}

/// The closed Tier-1 set. Seeded at bootstrap; never extended at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "title_case")]
pub enum Tier1Category {
    Financial,
    #[strum(serialize = "Tickets & Bookings")]
    #[serde(rename = "Tickets & Bookings")]
    TicketsAndBookings,
    Social,
    Promotions,
    Updates,
    Personal,
    Work,
    Other,
}

impl Tier1Category {
    pub const ALL: [Tier1Category; 8] = [
        Tier1Category::Financial,
        Tier1Category::TicketsAndBookings,
        Tier1Category::Social,
        Tier1Category::Promotions,
        Tier1Category::Updates,
        Tier1Category::Personal,
        Tier1Category::Work,
        Tier1Category::Other,
    ];

    pub fn slug(&self) -> String {
        crate::taxonomy::slugify(self.as_str_title())
    }

    pub fn as_str_title(&self) -> &'static str {
        match self {
            Self::Financial => "Financial",
            Self::TicketsAndBookings => "Tickets & Bookings",
            Self::Social => "Social",
            Self::Promotions => "Promotions",
            Self::Updates => "Updates",
            Self::Personal => "Personal",
            Self::Work => "Work",
            Self::Other => "Other",
        }
    }
}

// ── Message → label assignment ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub message_id: String,
    /// Tier-2 slug preferred, falls back to Tier-1 slug when no Tier-2.
    pub label_slug: String,
    pub assigned_at: DateTime<Utc>,
}

// ── Outbox ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutboxReason {
    NewAssignment,
    Relabel,
    RetryAfterError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelOutboxRow {
    pub id: Uuid,
    pub message_id: String,
    pub reason: OutboxReason,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveOutboxRow {
    pub id: Uuid,
    /// UNIQUE — at most one archive-outbox row per message.
    pub message_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

// ── Event extraction ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionStatus {
    Queued,
    Succeeded,
    NoEvent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "title_case")]
pub enum EventType {
    Theatre,
    Comedy,
    Opera,
    Ballet,
    Cinema,
    Social,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProvenance {
    pub model: String,
    pub prompt_version: String,
    pub raw_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// PK = message id.
    pub message_id: String,
    pub status: ExtractionStatus,
    pub event_name: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub end_time_inferred: bool,
    pub timezone: Option<String>,
    pub event_type: Option<EventType>,
    pub calendar_ical_uid: Option<String>,
    pub calendar_event_id: Option<String>,
    pub provenance: EventProvenance,
    pub error: Option<String>,
}

// ── Payment extraction ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentCategory {
    Subscription,
    Utility,
    Rent,
    Insurance,
    Loan,
    Shopping,
    Travel,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// PK = message id.
    pub message_id: String,
    pub item: Option<String>,
    pub vendor: String,
    pub category: PaymentCategory,
    /// Fixed 2-decimal string, e.g. "12.34".
    pub amount: String,
    pub currency: String,
    pub recurring: bool,
    pub frequency: Option<PaymentFrequency>,
    pub payment_date: NaiveDate,
    /// `normalize(vendor) | amount | currency | date`
    pub fingerprint: String,
    pub provenance: EventProvenance,
}

// ── Checkpoint ───────────────────────────────────────────────

pub const CHECKPOINT_KEY_LAST_INGESTED: &str = "last_ingested_timestamp";
pub const CHECKPOINT_KEY_CURRENT_PHASE: &str = "current_phase";
pub const CHECKPOINT_KEY_RETENTION_DEFAULT_DAYS: &str = "retention_default_days";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

// ── Policy (retention trash rules) ──────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyTrigger {
    Scheduled,
    OnIngest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyCadence {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyCondition {
    CategoryEquals { value: String },
    SubcategoryEquals { value: String },
    FromDomainEquals { value: String },
    SubjectContains { value: String },
    AgeDaysGt { days: i64 },
    IsUnreadEquals { flag: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub version: String,
    /// AND-only. OR/UNLESS is an explicit non-goal (spec §9).
    pub conditions: Vec<PolicyCondition>,
    pub retention_days: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub trigger: PolicyTrigger,
    pub cadence: PolicyCadence,
    pub definition: PolicyDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Vector index payload ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub message_id: String,
    pub vector: Vec<f32>,
    /// Embedding-provenance tag — queries restrict to a matching tag after
    /// a model upgrade rather than silently mixing incompatible vectors.
    pub vector_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorNeighbor {
    pub message_id: String,
    pub score: f64,
}
