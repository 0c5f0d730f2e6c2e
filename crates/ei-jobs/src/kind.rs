//! Job kinds, one per `ei-pipeline` operation the job runner wires up.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ingest,
    ClusterLabel,
    PerMessageLabel,
    PushLabels,
    PushArchive,
    PlanRetention,
    ExtractEvents,
    ExtractPayments,
    TrashSync,
    MaintenanceTaxonomy,
    MaintenanceOutboxGc,
    MaintenanceVectorGc,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "ingest",
            JobKind::ClusterLabel => "cluster-label",
            JobKind::PerMessageLabel => "per-message-label",
            JobKind::PushLabels => "push-labels",
            JobKind::PushArchive => "push-archive",
            JobKind::PlanRetention => "plan-retention",
            JobKind::ExtractEvents => "extract-events",
            JobKind::ExtractPayments => "extract-payments",
            JobKind::TrashSync => "trash-sync",
            JobKind::MaintenanceTaxonomy => "maintenance-taxonomy",
            JobKind::MaintenanceOutboxGc => "maintenance-outbox-gc",
            JobKind::MaintenanceVectorGc => "maintenance-vector-gc",
        }
    }
}
