//! Postgres adapters implementing `ei-core` port traits, built on
//! `sqlx::query`/`query_as` (string SQL, not `query!`, so the crate
//! compiles without a live database).

pub mod archive_outbox;
pub mod checkpoint;
pub mod cluster;
pub mod event;
pub mod label_outbox;
pub mod message;
pub mod payment;
pub mod policy;
pub mod taxonomy;

use sqlx::PgPool;

pub use archive_outbox::PgArchiveOutboxStore;
pub use checkpoint::PgCheckpointStore;
pub use cluster::PgClusterStore;
pub use event::PgEventStore;
pub use label_outbox::PgLabelOutboxStore;
pub use message::PgMessageStore;
pub use payment::PgPaymentStore;
pub use policy::PgPolicyStore;
pub use taxonomy::PgTaxonomyStore;

/// Embedded migrations, run once at process start via [`PgStores::migrate`].
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Convenience struct that constructs every Postgres adapter from a single
/// pool, mirroring the teacher workspace's `PgStores`.
pub struct PgStores {
    pub checkpoints: PgCheckpointStore,
    pub messages: PgMessageStore,
    pub clusters: PgClusterStore,
    pub taxonomy: PgTaxonomyStore,
    pub label_outbox: PgLabelOutboxStore,
    pub archive_outbox: PgArchiveOutboxStore,
    pub events: PgEventStore,
    pub payments: PgPaymentStore,
    pub policies: PgPolicyStore,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            checkpoints: PgCheckpointStore::new(pool.clone()),
            messages: PgMessageStore::new(pool.clone()),
            clusters: PgClusterStore::new(pool.clone()),
            taxonomy: PgTaxonomyStore::new(pool.clone()),
            label_outbox: PgLabelOutboxStore::new(pool.clone()),
            archive_outbox: PgArchiveOutboxStore::new(pool.clone()),
            events: PgEventStore::new(pool.clone()),
            payments: PgPaymentStore::new(pool.clone()),
            policies: PgPolicyStore::new(pool),
        }
    }

    pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(pool).await
    }
}

pub(crate) fn internal(e: sqlx::Error) -> ei_core::PipelineError {
    ei_core::PipelineError::Internal(anyhow::anyhow!(e))
}
