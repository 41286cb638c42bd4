//! Grouping of the assigned records and pivot of the per-candidate sums.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::debug;

use crate::config::*;

#[derive(Default)]
struct GroupAccumulator {
    votes_a: u64,
    votes_b: u64,
    record_count: usize,
    latitude_sum: f64,
    longitude_sum: f64,
}

/// The polling places where both tracked candidates have records.
fn contested_locations<'a>(
    records: &'a [AssignedVoteRecord],
    pair: &CandidatePair,
) -> HashSet<&'a str> {
    let mut seen: HashMap<&str, (bool, bool)> = HashMap::new();
    for r in records.iter() {
        let e = seen.entry(r.record.location.as_str()).or_insert((false, false));
        match pair.side(&r.record.candidate) {
            Some(Side::A) => e.0 = true,
            Some(Side::B) => e.1 = true,
            None => {}
        }
    }
    seen.into_iter()
        .filter_map(|(loc, (a, b))| if a && b { Some(loc) } else { None })
        .collect()
}

fn candidate_filtered<'a>(
    records: &'a [AssignedVoteRecord],
    pair: &CandidatePair,
    candidates: CandidateFilter,
) -> Vec<&'a AssignedVoteRecord> {
    match candidates {
        CandidateFilter::Both => records.iter().collect(),
        CandidateFilter::OnlyA => records
            .iter()
            .filter(|r| pair.side(&r.record.candidate) == Some(Side::A))
            .collect(),
        CandidateFilter::OnlyB => records
            .iter()
            .filter(|r| pair.side(&r.record.candidate) == Some(Side::B))
            .collect(),
        CandidateFilter::Comparative => {
            let contested = contested_locations(records, pair);
            records
                .iter()
                .filter(|r| contested.contains(r.record.location.as_str()))
                .collect()
        }
    }
}

/// Applies the candidate filter, then the zone, then the polling places.
pub fn filter_records<'a>(
    records: &'a [AssignedVoteRecord],
    pair: &CandidatePair,
    filter: &RecordFilter,
) -> Vec<&'a AssignedVoteRecord> {
    let locations: HashSet<&str> = filter.locations.iter().map(|s| s.as_str()).collect();
    candidate_filtered(records, pair, filter.candidates)
        .into_iter()
        .filter(|r| filter.zone.map(|z| r.record.zone == z).unwrap_or(true))
        .filter(|r| locations.is_empty() || locations.contains(r.record.location.as_str()))
        .collect()
}

fn group_of(r: &AssignedVoteRecord, key: AggregationKey) -> GroupValue {
    match key {
        AggregationKey::PollingPlace => GroupValue::Named(r.record.location.clone()),
        AggregationKey::Zone => GroupValue::Named(r.record.zone.to_string()),
        AggregationKey::Region => match &r.region {
            Some(name) => GroupValue::Named(name.clone()),
            None => GroupValue::Unassigned,
        },
    }
}

/// Sums the votes of the two tracked candidates for each group.
///
/// Every group seen in the filtered records gets exactly one entry, with both
/// sums present (zero if the candidate has no votes there). The entries are in
/// group order.
pub fn aggregate(
    records: &[AssignedVoteRecord],
    pair: &CandidatePair,
    key: AggregationKey,
    filter: &RecordFilter,
) -> Vec<GroupSums> {
    let filtered = filter_records(records, pair, filter);
    debug!(
        "aggregate: {} records after filter {:?}, key {:?}",
        filtered.len(),
        filter,
        key
    );
    // Zones are numbers: keep their numerical order rather than the textual one.
    let mut groups: BTreeMap<(Option<u32>, GroupValue), GroupAccumulator> = BTreeMap::new();
    for r in filtered.into_iter() {
        let order = match key {
            AggregationKey::Zone => Some(r.record.zone),
            _ => None,
        };
        let acc = groups.entry((order, group_of(r, key))).or_default();
        match pair.side(&r.record.candidate) {
            Some(Side::A) => acc.votes_a += r.record.votes,
            Some(Side::B) => acc.votes_b += r.record.votes,
            None => {}
        }
        acc.record_count += 1;
        acc.latitude_sum += r.record.latitude;
        acc.longitude_sum += r.record.longitude;
    }
    groups
        .into_iter()
        .map(|((_, group), acc)| GroupSums {
            group,
            votes_a: acc.votes_a,
            votes_b: acc.votes_b,
            record_count: acc.record_count,
            position: if acc.record_count > 0 {
                Some(GeoPosition {
                    latitude: acc.latitude_sum / acc.record_count as f64,
                    longitude: acc.longitude_sum / acc.record_count as f64,
                })
            } else {
                None
            },
        })
        .collect()
}

/// Sums of the two tracked candidates over the whole batch.
pub fn candidate_totals(records: &[AssignedVoteRecord], pair: &CandidatePair) -> (u64, u64) {
    records
        .iter()
        .fold((0, 0), |(a, b), r| match pair.side(&r.record.candidate) {
            Some(Side::A) => (a + r.record.votes, b),
            Some(Side::B) => (a, b + r.record.votes),
            None => (a, b),
        })
}

/// The zones that can be selected under a candidate filter, sorted.
pub fn available_zones(
    records: &[AssignedVoteRecord],
    pair: &CandidatePair,
    candidates: CandidateFilter,
) -> Vec<u32> {
    let zones: BTreeSet<u32> = candidate_filtered(records, pair, candidates)
        .iter()
        .map(|r| r.record.zone)
        .collect();
    zones.into_iter().collect()
}

/// The polling places that can be selected under a candidate filter and an
/// optional zone, sorted.
pub fn available_locations(
    records: &[AssignedVoteRecord],
    pair: &CandidatePair,
    candidates: CandidateFilter,
    zone: Option<u32>,
) -> Vec<String> {
    let locations: BTreeSet<&str> = candidate_filtered(records, pair, candidates)
        .iter()
        .filter(|r| zone.map(|z| r.record.zone == z).unwrap_or(true))
        .map(|r| r.record.location.as_str())
        .collect();
    locations.into_iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rec(
        candidate: &str,
        location: &str,
        zone: u32,
        votes: u64,
        region: Option<&str>,
    ) -> AssignedVoteRecord {
        AssignedVoteRecord {
            record: SanitizedVoteRecord {
                candidate: candidate.to_string(),
                location: location.to_string(),
                zone,
                votes,
                latitude: -22.9,
                longitude: -43.2,
            },
            region: region.map(|s| s.to_string()),
        }
    }

    pub(crate) fn pair() -> CandidatePair {
        CandidatePair::new("ALICE", "BOB")
    }

    pub(crate) fn sample() -> Vec<AssignedVoteRecord> {
        vec![
            rec("ALICE", "ESCOLA A", 1, 120, Some("Centro")),
            rec("BOB", "ESCOLA A", 1, 80, Some("Centro")),
            rec("ALICE", "ESCOLA B", 10, 50, Some("Tijuca")),
            rec("BOB", "ESCOLA B", 10, 50, Some("Tijuca")),
            rec("ALICE", "ESCOLA C", 2, 30, None),
            rec("CAROL", "ESCOLA C", 2, 10, None),
            rec("BOB", "ESCOLA E", 2, 25, Some("Centro")),
            rec("CAROL", "ESCOLA F", 2, 7, Some("Centro")),
        ]
    }

    fn names(sums: &[GroupSums]) -> Vec<String> {
        sums.iter().map(|s| s.group.to_string()).collect()
    }

    #[test]
    fn one_row_per_polling_place() {
        let sums = aggregate(
            &sample(),
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::Both),
        );
        assert_eq!(
            names(&sums),
            vec!["ESCOLA A", "ESCOLA B", "ESCOLA C", "ESCOLA E", "ESCOLA F"]
        );
        assert_eq!((sums[0].votes_a, sums[0].votes_b), (120, 80));
        assert_eq!((sums[2].votes_a, sums[2].votes_b), (30, 0));
        assert_eq!((sums[3].votes_a, sums[3].votes_b), (0, 25));
        // Only untracked candidates: the row is still there.
        assert_eq!((sums[4].votes_a, sums[4].votes_b), (0, 0));
        assert_eq!(sums[4].record_count, 1);
    }

    #[test]
    fn zones_in_numerical_order() {
        let sums = aggregate(
            &sample(),
            &pair(),
            AggregationKey::Zone,
            &RecordFilter::new(CandidateFilter::Both),
        );
        assert_eq!(names(&sums), vec!["1", "2", "10"]);
        assert_eq!((sums[1].votes_a, sums[1].votes_b), (30, 25));
    }

    #[test]
    fn unassigned_bucket_comes_last() {
        let sums = aggregate(
            &sample(),
            &pair(),
            AggregationKey::Region,
            &RecordFilter::new(CandidateFilter::Both),
        );
        assert_eq!(names(&sums), vec!["Centro", "Tijuca", "Unassigned"]);
        assert_eq!(sums[2].group, GroupValue::Unassigned);
        assert_eq!((sums[0].votes_a, sums[0].votes_b), (120, 105));
        assert_eq!((sums[2].votes_a, sums[2].votes_b), (30, 0));
    }

    #[test]
    fn comparative_keeps_contested_places() {
        let sums = aggregate(
            &sample(),
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::Comparative),
        );
        assert_eq!(names(&sums), vec!["ESCOLA A", "ESCOLA B"]);
    }

    #[test]
    fn single_candidate_backfills_the_other() {
        let sums = aggregate(
            &sample(),
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::OnlyB),
        );
        assert_eq!(names(&sums), vec!["ESCOLA A", "ESCOLA B", "ESCOLA E"]);
        assert!(sums.iter().all(|s| s.votes_a == 0));
    }

    #[test]
    fn zone_and_location_filters() {
        let mut filter = RecordFilter::new(CandidateFilter::Both);
        filter.zone = Some(2);
        let sums = aggregate(&sample(), &pair(), AggregationKey::PollingPlace, &filter);
        assert_eq!(names(&sums), vec!["ESCOLA C", "ESCOLA E", "ESCOLA F"]);

        filter.locations = vec!["ESCOLA E".to_string(), "ESCOLA A".to_string()];
        let sums = aggregate(&sample(), &pair(), AggregationKey::PollingPlace, &filter);
        assert_eq!(names(&sums), vec!["ESCOLA E"]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let sums = aggregate(
            &[],
            &pair(),
            AggregationKey::Region,
            &RecordFilter::new(CandidateFilter::Comparative),
        );
        assert!(sums.is_empty());

        let mut filter = RecordFilter::new(CandidateFilter::Both);
        filter.zone = Some(99);
        assert!(aggregate(&sample(), &pair(), AggregationKey::Zone, &filter).is_empty());
    }

    #[test]
    fn mean_position() {
        let mut records = sample();
        records[1].record.latitude = -22.7;
        let sums = aggregate(
            &records,
            &pair(),
            AggregationKey::PollingPlace,
            &RecordFilter::new(CandidateFilter::Both),
        );
        let p = sums[0].position.unwrap();
        assert!((p.latitude + 22.8).abs() < 1e-9);
        assert!((p.longitude + 43.2).abs() < 1e-9);
    }

    #[test]
    fn selectable_zones_and_locations() {
        let records = sample();
        assert_eq!(
            available_zones(&records, &pair(), CandidateFilter::Comparative),
            vec![1, 10]
        );
        assert_eq!(
            available_zones(&records, &pair(), CandidateFilter::Both),
            vec![1, 2, 10]
        );
        assert_eq!(
            available_locations(&records, &pair(), CandidateFilter::OnlyA, Some(2)),
            vec!["ESCOLA C".to_string()]
        );
    }

    #[test]
    fn batch_totals() {
        assert_eq!(candidate_totals(&sample(), &pair()), (200, 155));
    }
}
