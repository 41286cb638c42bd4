use std::path::{Path, PathBuf};

use vote_synergy::*;

use crate::atlas::*;

pub const CANDIDATE_FILTERS: [(&str, CandidateFilter); 4] = [
    ("comparative", CandidateFilter::Comparative),
    ("both", CandidateFilter::Both),
    ("only-a", CandidateFilter::OnlyA),
    ("only-b", CandidateFilter::OnlyB),
];

pub const AGGREGATION_KEYS: [(&str, AggregationKey); 3] = [
    ("polling-place", AggregationKey::PollingPlace),
    ("zone", AggregationKey::Zone),
    ("region", AggregationKey::Region),
];

pub const METRICS: [(&str, MetricKind); 6] = [
    ("synergy", MetricKind::Synergy),
    ("absolute-synergy", MetricKind::AbsoluteSynergy),
    ("victory-magnitude", MetricKind::VictoryMagnitude),
    ("combined-strength", MetricKind::CombinedStrength),
    ("total-votes", MetricKind::TotalVotes),
    ("synergy-weight", MetricKind::SynergyWeight),
];

pub const VIEWS: [(&str, View); 3] = [
    ("points", View::Points),
    ("regions", View::Regions),
    ("heatmap", View::Heatmap),
];

pub const FORMATS: [(&str, OutputFormat); 2] =
    [("json", OutputFormat::Json), ("csv", OutputFormat::Csv)];

pub const COLOR_POLICIES: [(&str, ColorPolicyKind); 2] = [
    ("linear", ColorPolicyKind::Linear),
    ("percentile", ColorPolicyKind::Percentile),
];

pub const SORT_KEYS: [(&str, SortKey); 8] = [
    ("votes-a", SortKey::VotesA),
    ("votes-b", SortKey::VotesB),
    ("total", SortKey::Total),
    ("margin", SortKey::Margin),
    ("abs-margin", SortKey::AbsMargin),
    ("synergy", SortKey::Synergy),
    ("combined-strength", SortKey::CombinedStrength),
    ("synergy-weight", SortKey::SynergyWeight),
];

/// Reads the value of a named option. Case and `_` / `-` are not significant.
pub fn parse_option<T: Copy>(option: &str, value: &str, table: &[(&str, T)]) -> AtlasResult<T> {
    let normalized = value.trim().to_lowercase().replace('_', "-");
    match table.iter().find(|(name, _)| *name == normalized) {
        Some((_, v)) => Ok(*v),
        None => InvalidOptionSnafu {
            option,
            value,
        }
        .fail(),
    }
}

pub fn option_name<T: Copy + PartialEq>(value: T, table: &[(&'static str, T)]) -> &'static str {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(name, _)| *name)
        .unwrap_or("")
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Resolves a path of the configuration file against the directory of the file.
pub fn resolve_path(root: Option<&Path>, path: &str) -> String {
    match root {
        Some(r) if Path::new(path).is_relative() => {
            let p: PathBuf = [r, Path::new(path)].iter().collect();
            p.as_path().display().to_string()
        }
        _ => path.to_string(),
    }
}
