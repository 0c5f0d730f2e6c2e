//! Job id generation (spec §4.7): `job-<yyyymmdd-hhmmss>-<kind>-<hex>`.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::kind::JobKind;

pub fn generate(kind: JobKind, now: DateTime<Utc>) -> String {
    let timestamp = now.format("%Y%m%d-%H%M%S");
    let hex: String = {
        let mut rng = rand::thread_rng();
        (0..8).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
    };
    format!("job-{timestamp}-{}-{hex}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_matches_expected_shape() {
        let now = DateTime::parse_from_rfc3339("2026-03-02T10:15:30Z").unwrap().with_timezone(&Utc);
        let id = generate(JobKind::Ingest, now);
        assert!(id.starts_with("job-20260302-101530-ingest-"));
        assert_eq!(id.len(), "job-20260302-101530-ingest-".len() + 8);
    }

    #[test]
    fn two_generated_ids_differ() {
        let now = Utc::now();
        let a = generate(JobKind::Ingest, now);
        let b = generate(JobKind::Ingest, now);
        assert_ne!(a, b);
    }
}
