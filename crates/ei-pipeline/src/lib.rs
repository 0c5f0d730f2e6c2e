//! ei-pipeline — the classification/extraction/retention workflows that
//! turn ingested messages into labelled, enriched, policy-governed state.
//!
//! Depends only on the port traits in `ei-core`, plus `ei-provider` and
//! `ei-llm` — never on a concrete storage or model adapter, so every
//! operation here is exercised against in-memory fakes in its own test
//! module without a database or model server.
//!
//! Jobs:
//!   `ingest`             — pull new provider messages into the message store
//!   `cluster_label`      — cluster unlabelled messages and assign taxonomy
//!   `per_message_label`  — fallback single-message classification
//!   `outbox`             — drain label/archive outbox rows to the provider
//!   `retention`          — plan age- and policy-based archival
//!   `trash_sync`         — mirror provider-side trash state
//!   `maintenance`        — taxonomy merge, outbox GC, orphan-vector GC
//!   `extract_event`      — event extraction from message bodies
//!   `extract_payment`    — payment extraction from message bodies
//!   `calendar`           — optional calendar publish for extracted events

pub mod calendar;
pub mod cluster_label;
pub mod config;
pub mod extract_event;
pub mod extract_payment;
pub mod ingest;
pub mod maintenance;
pub mod outbox;
pub mod per_message_label;
pub mod retention;
pub mod trash_sync;
