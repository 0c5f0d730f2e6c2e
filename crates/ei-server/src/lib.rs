//! ei-server — the read-only dashboard/analytics surface plus job-control
//! and SSE endpoints (C12, spec §6).
//!
//! Routes:
//!   GET  /health
//!   GET  /dashboard/summary
//!   GET  /taxonomy
//!   GET  /taxonomy/:parent_slug/children
//!   GET  /messages/recent?since=&limit=
//!   GET  /messages/:provider_id
//!   GET  /messages/:provider_id/event
//!   GET  /messages/:provider_id/payment
//!   GET  /jobs
//!   POST /jobs/:kind
//!   GET  /jobs/id/:job_id
//!   GET  /jobs/id/:job_id/events   (SSE, 15s keep-alive)
//!
//! There is no write surface over message content: labels, archiving, and
//! retention are driven by jobs, not by direct HTTP mutation.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
