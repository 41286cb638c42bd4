//! Margin and synergy scores derived from the per-candidate sums.
//!
//! Raw margins rank landslides highest and synergy alone ignores turnout: a
//! close 10-vote contest must not outrank a close 10,000-vote one. Combined
//! strength scales synergy by the group's total relative to the largest total
//! of the current table, which is why it can only be computed once the whole
//! filtered table is known.

use crate::config::*;

/// Guards the relative imbalance against a zero total.
pub const EPSILON: f64 = 1e-9;

/// The scores of a single group that do not depend on the rest of the table.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct PairMetrics {
    pub total: u64,
    pub margin: i64,
    pub abs_margin: u64,
    pub relative_imbalance: f64,
    pub synergy: f64,
    pub synergy_weight: f64,
}

pub fn pair_metrics(votes_a: u64, votes_b: u64) -> PairMetrics {
    let total = votes_a + votes_b;
    let margin = votes_a as i64 - votes_b as i64;
    let abs_margin = margin.unsigned_abs();
    let relative_imbalance = abs_margin as f64 / (total as f64 + EPSILON);
    // Unanimous and empty groups have no synergy.
    let synergy = if votes_a == 0 || votes_b == 0 {
        0.0
    } else {
        (1.0 - relative_imbalance).clamp(0.0, 1.0)
    };
    PairMetrics {
        total,
        margin,
        abs_margin,
        relative_imbalance,
        synergy,
        synergy_weight: total as f64 * synergy.sqrt(),
    }
}

pub fn combined_strength(synergy: f64, total: u64, max_total: u64) -> f64 {
    if max_total == 0 {
        0.0
    } else {
        (synergy * (total as f64 / max_total as f64)).clamp(0.0, 1.0)
    }
}

/// Derives all the scores of a freshly aggregated table.
///
/// The largest total is taken over the given sums before any combined
/// strength is computed.
pub fn score_table(key: AggregationKey, sums: Vec<GroupSums>) -> AggregatedTable {
    let max_total = sums
        .iter()
        .map(|s| s.votes_a + s.votes_b)
        .max()
        .unwrap_or(0);
    let rows: Vec<AggregatedRow> = sums
        .into_iter()
        .map(|s| {
            let m = pair_metrics(s.votes_a, s.votes_b);
            AggregatedRow {
                group: s.group,
                votes_a: s.votes_a,
                votes_b: s.votes_b,
                total: m.total,
                margin: m.margin,
                abs_margin: m.abs_margin,
                relative_imbalance: m.relative_imbalance,
                synergy: m.synergy,
                synergy_weight: m.synergy_weight,
                combined_strength: combined_strength(m.synergy, m.total, max_total),
                record_count: s.record_count,
                position: s.position,
            }
        })
        .collect();
    AggregatedTable {
        key,
        rows,
        max_total,
    }
}

/// A row for a group without any vote, with all the metrics at their
/// degenerate values.
pub fn empty_row(group: GroupValue) -> AggregatedRow {
    let m = pair_metrics(0, 0);
    AggregatedRow {
        group,
        votes_a: 0,
        votes_b: 0,
        total: m.total,
        margin: m.margin,
        abs_margin: m.abs_margin,
        relative_imbalance: m.relative_imbalance,
        synergy: m.synergy,
        synergy_weight: m.synergy_weight,
        combined_strength: 0.0,
        record_count: 0,
        position: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sums(name: &str, a: u64, b: u64) -> GroupSums {
        GroupSums {
            group: GroupValue::Named(name.to_string()),
            votes_a: a,
            votes_b: b,
            record_count: 2,
            position: None,
        }
    }

    #[test]
    fn worked_example() {
        let m = pair_metrics(120, 80);
        assert_eq!(m.total, 200);
        assert_eq!(m.margin, 40);
        assert_eq!(m.abs_margin, 40);
        assert!((m.relative_imbalance - 0.2).abs() < 1e-9);
        assert!((m.synergy - 0.8).abs() < 1e-9);
        assert!((m.synergy_weight - 200.0 * 0.8f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn negative_margin() {
        let m = pair_metrics(80, 120);
        assert_eq!(m.margin, -40);
        assert_eq!(m.abs_margin, 40);
        assert!((m.synergy - 0.8).abs() < 1e-9);
    }

    #[test]
    fn zero_total_is_degenerate_not_nan() {
        let m = pair_metrics(0, 0);
        assert_eq!(m.total, 0);
        assert_eq!(m.margin, 0);
        assert_eq!(m.relative_imbalance, 0.0);
        assert_eq!(m.synergy, 0.0);
        assert_eq!(m.synergy_weight, 0.0);
        assert_eq!(combined_strength(m.synergy, 0, 0), 0.0);
    }

    #[test]
    fn synergy_bounds() {
        for a in 0..40u64 {
            for b in 0..40u64 {
                let m = pair_metrics(a, b);
                assert_eq!(m.total, a + b);
                assert!((0.0..=1.0).contains(&m.synergy));
                if m.total > 0 {
                    let landslide = a == m.total || b == m.total;
                    assert_eq!(m.synergy.abs() < 1e-6, landslide, "a={} b={}", a, b);
                }
            }
        }
        assert!((pair_metrics(7, 7).synergy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unanimous_groups_have_no_synergy() {
        for (a, b) in [(10, 0), (0, 100), (1000, 0)] {
            let m = pair_metrics(a, b);
            assert_eq!(m.synergy, 0.0);
            assert_eq!(m.synergy_weight, 0.0);
        }
        let table = score_table(
            AggregationKey::PollingPlace,
            vec![sums("a", 10, 0), sums("b", 100, 0), sums("c", 1000, 0)],
        );
        assert!(table
            .rows
            .iter()
            .all(|r| r.synergy == 0.0 && r.combined_strength == 0.0));
    }

    #[test]
    fn combined_strength_favors_volume() {
        let table = score_table(
            AggregationKey::PollingPlace,
            vec![sums("small", 5, 5), sums("large", 5000, 5000), sums("skewed", 9000, 1000)],
        );
        assert_eq!(table.max_total, 10000);
        let small = &table.rows[0];
        let large = &table.rows[1];
        let skewed = &table.rows[2];
        assert!((small.synergy - large.synergy).abs() < 1e-9);
        assert!(large.combined_strength > small.combined_strength);
        assert!((large.combined_strength - 1.0).abs() < 1e-9);
        assert!((skewed.combined_strength - 0.2).abs() < 1e-9);
        for r in table.rows.iter() {
            assert_eq!(r.total, r.votes_a + r.votes_b);
            assert_eq!(r.margin, r.votes_a as i64 - r.votes_b as i64);
        }
    }

    #[test]
    fn max_total_follows_the_table() {
        let full = score_table(
            AggregationKey::Zone,
            vec![sums("1", 10, 10), sums("2", 100, 100)],
        );
        let filtered = score_table(AggregationKey::Zone, vec![sums("1", 10, 10)]);
        assert!((full.rows[0].combined_strength - 0.1).abs() < 1e-9);
        assert!((filtered.rows[0].combined_strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_table() {
        let table = score_table(
            AggregationKey::Region,
            vec![sums("a", 0, 0), sums("b", 0, 0)],
        );
        assert_eq!(table.max_total, 0);
        assert!(table
            .rows
            .iter()
            .all(|r| r.synergy == 0.0 && r.combined_strength == 0.0 && r.margin == 0));
        assert_eq!(empty_row(GroupValue::Unassigned).synergy, 0.0);
    }

    #[test]
    fn empty_table() {
        let table = score_table(AggregationKey::Region, vec![]);
        assert!(table.is_empty());
        assert_eq!(table.max_total, 0);
    }
}
