//! Cluster/sender analysis labels: mean-gap frequency and unread ratio
//! (spec §4.2 step 5), and reproducible sample-size/seed selection.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{Frequency, UnreadRatio};

/// Mean-gap-in-days thresholds: {2,10,40,150} from spec §4.2.
pub fn frequency_from_timestamps(timestamps: &[DateTime<Utc>]) -> Option<Frequency> {
    if timestamps.len() < 2 {
        return None;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    let span_days = (sorted.last().unwrap().timestamp() - sorted.first().unwrap().timestamp()) as f64
        / 86_400.0;
    let mean_gap_days = span_days / (sorted.len() - 1) as f64;

    Some(if mean_gap_days <= 2.0 {
        Frequency::Daily
    } else if mean_gap_days <= 10.0 {
        Frequency::Weekly
    } else if mean_gap_days <= 40.0 {
        Frequency::Monthly
    } else if mean_gap_days <= 150.0 {
        Frequency::Quarterly
    } else {
        Frequency::Yearly
    })
}

/// Unread ratio bucket from a plain fraction: 1.0 is `all`, [0.9, 1.0) is
/// `almost_all`, 0.0 is `none`, (0, 0.1] is `almost_none`, anything else is
/// `some`.
pub fn unread_ratio_from_fraction(unread: usize, total: usize) -> UnreadRatio {
    if total == 0 {
        return UnreadRatio::None;
    }
    let ratio = unread as f64 / total as f64;
    if ratio == 1.0 {
        UnreadRatio::All
    } else if ratio >= 0.9 {
        UnreadRatio::AlmostAll
    } else if ratio == 0.0 {
        UnreadRatio::None
    } else if ratio <= 0.1 {
        UnreadRatio::AlmostNone
    } else {
        UnreadRatio::Some
    }
}

/// How many cluster members to sample bodies for, by cluster size
/// (spec §4.2 step 4): ≤5→1, 6–10→2, 11–50→3, >50→4.
pub fn sample_size_for_cluster(cluster_size: usize) -> usize {
    match cluster_size {
        0..=5 => 1,
        6..=10 => 2,
        11..=50 => 3,
        _ => 4,
    }
}

/// Deterministic RNG seed derived from the cluster uuid so repeated runs
/// pick the same sample.
pub fn sample_seed(cluster_id: Uuid) -> u64 {
    let bytes = cluster_id.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().unwrap())
}

/// Deterministically selects `n` indices out of `len` candidates using a
/// simple xorshift PRNG seeded from `seed`, so the same cluster always
/// samples the same members without pulling in a general-purpose RNG crate
/// for a one-off selection.
pub fn deterministic_sample_indices(len: usize, n: usize, seed: u64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let n = n.min(len);
    let mut state = seed.max(1);
    let mut indices: Vec<usize> = (0..len).collect();
    // Fisher–Yates shuffle driven by xorshift64.
    for i in (1..indices.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices.truncate(n);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(days: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + days * 86_400, 0).unwrap()
    }

    #[test]
    fn frequency_buckets_by_mean_gap() {
        assert_eq!(frequency_from_timestamps(&[ts(0), ts(1)]), Some(Frequency::Daily));
        assert_eq!(frequency_from_timestamps(&[ts(0), ts(7)]), Some(Frequency::Weekly));
        assert_eq!(frequency_from_timestamps(&[ts(0), ts(30)]), Some(Frequency::Monthly));
        assert_eq!(frequency_from_timestamps(&[ts(0), ts(100)]), Some(Frequency::Quarterly));
        assert_eq!(frequency_from_timestamps(&[ts(0), ts(300)]), Some(Frequency::Yearly));
    }

    #[test]
    fn frequency_requires_at_least_two_points() {
        assert_eq!(frequency_from_timestamps(&[ts(0)]), None);
        assert_eq!(frequency_from_timestamps(&[]), None);
    }

    #[test]
    fn unread_ratio_buckets() {
        assert_eq!(unread_ratio_from_fraction(10, 10), UnreadRatio::All);
        assert_eq!(unread_ratio_from_fraction(19, 20), UnreadRatio::AlmostAll);
        assert_eq!(unread_ratio_from_fraction(5, 10), UnreadRatio::Some);
        assert_eq!(unread_ratio_from_fraction(1, 10), UnreadRatio::AlmostNone);
        assert_eq!(unread_ratio_from_fraction(0, 10), UnreadRatio::None);
        assert_eq!(unread_ratio_from_fraction(0, 0), UnreadRatio::None);
    }

    #[test]
    fn sample_size_thresholds() {
        assert_eq!(sample_size_for_cluster(3), 1);
        assert_eq!(sample_size_for_cluster(5), 1);
        assert_eq!(sample_size_for_cluster(6), 2);
        assert_eq!(sample_size_for_cluster(10), 2);
        assert_eq!(sample_size_for_cluster(11), 3);
        assert_eq!(sample_size_for_cluster(50), 3);
        assert_eq!(sample_size_for_cluster(51), 4);
    }

    #[test]
    fn deterministic_sample_is_reproducible() {
        let id = Uuid::new_v4();
        let seed = sample_seed(id);
        let a = deterministic_sample_indices(20, 3, seed);
        let b = deterministic_sample_indices(20, 3, seed);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}
