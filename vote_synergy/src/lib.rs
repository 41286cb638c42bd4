mod config;
pub mod aggregate;
pub mod cache;
pub mod color;
pub mod coords;
pub mod metrics;
pub mod rank;
pub mod spatial;

use log::{info, warn};

pub use crate::config::*;

/// Runs one filter request against an assigned batch.
///
/// The batch itself is never modified: every request produces a fresh table,
/// and running the same request twice gives the same table.
pub fn build_table(
    records: &[AssignedVoteRecord],
    pair: &CandidatePair,
    key: AggregationKey,
    filter: &RecordFilter,
) -> AggregatedTable {
    info!(
        "build_table: {} records, key {:?}, candidates {:?}, zone {:?}, {} locations",
        records.len(),
        key,
        filter.candidates,
        filter.zone,
        filter.locations.len()
    );
    let sums = aggregate::aggregate(records, pair, key, filter);
    let table = metrics::score_table(key, sums);
    if table.is_empty() {
        warn!("build_table: no group left after filtering");
    } else {
        info!(
            "build_table: {} groups, largest total {}",
            table.rows.len(),
            table.max_total
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{pair, sample};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn requests_are_idempotent() {
        init();
        let records = sample();
        let filter = RecordFilter::new(CandidateFilter::Both);
        let first = build_table(&records, &pair(), AggregationKey::Region, &filter);
        let second = build_table(&records, &pair(), AggregationKey::Region, &filter);
        assert_eq!(first, second);
        assert_eq!(records, sample());
    }

    #[test]
    fn filtering_back_to_both_restores_the_table() {
        init();
        let records = sample();
        let both = RecordFilter::new(CandidateFilter::Both);
        let before = build_table(&records, &pair(), AggregationKey::PollingPlace, &both);
        let only_a = build_table(
            &records,
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::OnlyA),
        );
        assert!(only_a.rows.iter().all(|r| r.votes_b == 0));
        let after = build_table(&records, &pair(), AggregationKey::PollingPlace, &both);
        assert_eq!(before, after);
    }

    #[test]
    fn row_invariants() {
        init();
        let records = sample();
        for key in [
            AggregationKey::PollingPlace,
            AggregationKey::Zone,
            AggregationKey::Region,
        ] {
            for candidates in [
                CandidateFilter::Comparative,
                CandidateFilter::Both,
                CandidateFilter::OnlyA,
                CandidateFilter::OnlyB,
            ] {
                let t = build_table(&records, &pair(), key, &RecordFilter::new(candidates));
                for r in t.rows.iter() {
                    assert_eq!(r.total, r.votes_a + r.votes_b);
                    assert_eq!(r.margin, r.votes_a as i64 - r.votes_b as i64);
                    assert!((0.0..=1.0).contains(&r.synergy));
                    assert!((0.0..=1.0).contains(&r.combined_strength));
                    if r.total == 0 {
                        assert_eq!(r.synergy, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn worked_example_through_the_pipeline() {
        init();
        let t = build_table(
            &sample(),
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::Comparative),
        );
        let row = t
            .row(&GroupValue::Named("ESCOLA A".to_string()))
            .unwrap();
        assert_eq!((row.total, row.margin, row.abs_margin), (200, 40, 40));
        assert!((row.synergy - 0.8).abs() < 1e-9);
        assert!((row.combined_strength - 0.8).abs() < 1e-9);
    }
}
