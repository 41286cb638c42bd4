//! Top and bottom lists of an aggregated table.

use std::cmp::Ordering;

use crate::config::*;

/// How many rows the largest polling places series keeps.
pub const LARGEST_PLACES: usize = 40;

fn sort_value(row: &AggregatedRow, key: SortKey) -> f64 {
    match key {
        SortKey::VotesA => row.votes_a as f64,
        SortKey::VotesB => row.votes_b as f64,
        SortKey::Total => row.total as f64,
        SortKey::Margin => row.margin as f64,
        SortKey::AbsMargin => row.abs_margin as f64,
        SortKey::Synergy => row.synergy,
        SortKey::CombinedStrength => row.combined_strength,
        SortKey::SynergyWeight => row.synergy_weight,
    }
}

/// The first `n` rows with votes, sorted by `key`.
///
/// Rows without any vote are left out. Ties keep the order of the table.
pub fn extract(
    rows: &[AggregatedRow],
    key: SortKey,
    direction: SortDirection,
    n: usize,
) -> Vec<AggregatedRow> {
    let mut res: Vec<&AggregatedRow> = rows.iter().filter(|r| r.total > 0).collect();
    res.sort_by(|x, y| {
        let ord: Ordering = sort_value(x, key).total_cmp(&sort_value(y, key));
        match direction {
            SortDirection::Lowest => ord,
            SortDirection::Highest => ord.reverse(),
        }
    });
    res.into_iter().take(n).cloned().collect()
}

/// A named ranking over a table.
#[derive(PartialEq, Debug, Clone)]
pub struct Ranking {
    pub title: String,
    pub key: SortKey,
    pub direction: SortDirection,
    pub rows: Vec<AggregatedRow>,
}

/// The rankings shown next to the map: the largest leads of each candidate,
/// the closest contests and the largest turnouts.
pub fn standard_rankings(table: &AggregatedTable, pair: &CandidatePair, n: usize) -> Vec<Ranking> {
    let presets = [
        (
            format!("Largest leads for {}", pair.a.label),
            SortKey::Margin,
            SortDirection::Highest,
        ),
        (
            format!("Largest leads for {}", pair.b.label),
            SortKey::Margin,
            SortDirection::Lowest,
        ),
        (
            "Closest contests".to_string(),
            SortKey::AbsMargin,
            SortDirection::Lowest,
        ),
        (
            "Largest turnout".to_string(),
            SortKey::Total,
            SortDirection::Highest,
        ),
    ];
    presets
        .into_iter()
        .map(|(title, key, direction)| Ranking {
            rows: extract(&table.rows, key, direction, n),
            title,
            key,
            direction,
        })
        .collect()
}

/// The largest groups by total, for the stacked comparison chart.
pub fn largest_places(table: &AggregatedTable) -> Vec<AggregatedRow> {
    extract(
        &table.rows,
        SortKey::Total,
        SortDirection::Highest,
        LARGEST_PLACES,
    )
}
