// Export payloads: the map layers, the rankings and the flat tables.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use vote_synergy::aggregate::{available_locations, available_zones, candidate_totals};
use vote_synergy::color::{color_rows, leader, point_radius};
use vote_synergy::metrics::empty_row;
use vote_synergy::rank::{largest_places, standard_rankings};
use vote_synergy::*;

use crate::atlas::config_reader::*;
use crate::atlas::io_common::*;
use crate::atlas::io_geojson::geometry_to_json;
use crate::atlas::*;

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct ExportRow {
    pub group: String,
    #[serde(rename = "votesA")]
    pub votes_a: u64,
    #[serde(rename = "votesB")]
    pub votes_b: u64,
    pub total: u64,
    pub margin: i64,
    #[serde(rename = "absMargin")]
    pub abs_margin: u64,
    #[serde(rename = "relativeImbalance")]
    pub relative_imbalance: f64,
    pub synergy: f64,
    #[serde(rename = "synergyWeight")]
    pub synergy_weight: f64,
    #[serde(rename = "combinedStrength")]
    pub combined_strength: f64,
    #[serde(rename = "recordCount")]
    pub record_count: usize,
    pub leader: String,
    /// `#rrggbbaa`
    pub color: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct PointFeature {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub color: [u8; 4],
    /// In meters.
    pub radius: f64,
    pub tooltip: String,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct RegionFeature {
    pub name: String,
    pub geometry: JSValue,
    pub color: [u8; 4],
    pub total: u64,
    pub tooltip: String,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub weight: f64,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct RankingExport {
    pub title: String,
    pub key: String,
    pub direction: String,
    pub rows: Vec<ExportRow>,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct CandidateExport {
    pub name: String,
    pub label: String,
    pub color: [u8; 3],
    pub votes: u64,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct BatchTotals {
    #[serde(rename = "linesRead")]
    pub lines_read: usize,
    #[serde(rename = "malformedLines")]
    pub malformed_lines: usize,
    #[serde(rename = "badVoteCounts")]
    pub bad_votes: usize,
    #[serde(rename = "badZones")]
    pub bad_zones: usize,
    #[serde(rename = "recordsKept")]
    pub records_kept: usize,
    #[serde(rename = "unrecoverableCoordinates")]
    pub unrecoverable: usize,
    #[serde(rename = "outOfBounds")]
    pub out_of_bounds: usize,
    pub unassigned: usize,
}

#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct FrameExport {
    pub latitude: f64,
    pub longitude: f64,
    /// `[min longitude, min latitude, max longitude, max latitude]`
    pub bounds: [f64; 4],
}

/// The result of one request, tagged with what produced it.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct Export {
    pub name: String,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
    pub view: String,
    #[serde(rename = "candidateFilter")]
    pub candidate_filter: String,
    #[serde(rename = "groupBy")]
    pub group_by: String,
    pub zone: Option<u32>,
    pub locations: Vec<String>,
    #[serde(rename = "colorBy")]
    pub color_by: String,
    #[serde(rename = "colorPolicy")]
    pub color_policy: String,
    pub candidates: Vec<CandidateExport>,
    pub empty: bool,
    pub totals: BatchTotals,
    pub frame: FrameExport,
    #[serde(rename = "availableZones")]
    pub available_zones: Vec<u32>,
    /// The polling places selectable under the candidate filter and the zone.
    #[serde(rename = "availableLocations")]
    pub available_locations: Vec<String>,
    pub rows: Vec<ExportRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<PointFeature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<RegionFeature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<Vec<HeatmapPoint>>,
    pub rankings: Vec<RankingExport>,
    #[serde(rename = "largestPlaces")]
    pub largest_places: Vec<ExportRow>,
}

fn hex_color(c: &Rgba) -> String {
    format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
}

fn leader_name(row: &AggregatedRow, pair: &CandidatePair) -> String {
    match leader(row) {
        Leader::A => pair.a.label.clone(),
        Leader::B => pair.b.label.clone(),
        Leader::Neither if row.total > 0 => "tie".to_string(),
        Leader::Neither => "none".to_string(),
    }
}

fn tooltip(row: &AggregatedRow, pair: &CandidatePair) -> String {
    format!(
        "{}\n{}: {}\n{}: {}\nTotal: {}\nMargin: {}\nSynergy: {:.2}",
        row.group, pair.a.label, row.votes_a, pair.b.label, row.votes_b, row.total, row.margin, row.synergy
    )
}

fn export_row(row: &AggregatedRow, color: &Rgba, pair: &CandidatePair) -> ExportRow {
    ExportRow {
        group: row.group.to_string(),
        votes_a: row.votes_a,
        votes_b: row.votes_b,
        total: row.total,
        margin: row.margin,
        abs_margin: row.abs_margin,
        relative_imbalance: row.relative_imbalance,
        synergy: row.synergy,
        synergy_weight: row.synergy_weight,
        combined_strength: row.combined_strength,
        record_count: row.record_count,
        leader: leader_name(row, pair),
        color: hex_color(color),
        latitude: row.position.map(|p| p.latitude),
        longitude: row.position.map(|p| p.longitude),
    }
}

fn point_features(
    table: &AggregatedTable,
    colors: &[Rgba],
    pair: &CandidatePair,
) -> Vec<PointFeature> {
    table
        .rows
        .iter()
        .zip(colors.iter())
        .filter_map(|(row, color)| {
            row.position.map(|p| PointFeature {
                id: row.group.to_string(),
                latitude: p.latitude,
                longitude: p.longitude,
                color: color.to_array(),
                radius: point_radius(row.total, table.max_total),
                tooltip: tooltip(row, pair),
            })
        })
        .collect()
}

/// Every region of the layer, in layer order, including the ones without votes.
fn region_features(
    batch: &LoadedBatch,
    pair: &CandidatePair,
    request: &Request,
    table: &AggregatedTable,
) -> Vec<RegionFeature> {
    let region_table = if table.key == AggregationKey::Region {
        table.clone()
    } else {
        build_table(&batch.records, pair, AggregationKey::Region, &request.filter)
    };
    let rows: Vec<AggregatedRow> = batch
        .regions
        .regions()
        .map(|r| {
            let group = GroupValue::Named(r.name.clone());
            region_table
                .row(&group)
                .cloned()
                .unwrap_or_else(|| empty_row(group))
        })
        .collect();
    let colors = color_rows(&rows, request.color_by, &request.scale, pair);
    batch
        .regions
        .regions()
        .zip(rows.iter().zip(colors.iter()))
        .map(|(region, (row, color))| RegionFeature {
            name: region.name.clone(),
            geometry: geometry_to_json(&region.geometry),
            color: color.to_array(),
            total: row.total,
            tooltip: tooltip(row, pair),
        })
        .collect()
}

/// Heat weights: synergy weight, or plain votes when only one candidate is shown.
fn heatmap_points(table: &AggregatedTable, candidates: CandidateFilter) -> Vec<HeatmapPoint> {
    table
        .rows
        .iter()
        .filter(|r| r.total > 0)
        .filter_map(|r| {
            r.position.map(|p| HeatmapPoint {
                latitude: p.latitude,
                longitude: p.longitude,
                weight: if candidates.is_single_candidate() {
                    r.total as f64
                } else {
                    r.synergy_weight
                },
            })
        })
        .collect()
}

pub fn build_export(
    batch: &LoadedBatch,
    pair: &CandidatePair,
    request: &Request,
    table: &AggregatedTable,
    exported_at: DateTime<Utc>,
) -> Export {
    if table.is_empty() {
        warn!("build_export: {}: no row for filter {:?}", request.name, request.filter);
    }
    let colors = color_rows(&table.rows, request.color_by, &request.scale, pair);
    let by_group: HashMap<&GroupValue, &Rgba> = table
        .rows
        .iter()
        .map(|r| &r.group)
        .zip(colors.iter())
        .collect();
    let neutral = Rgba::from_rgb(Rgba::NEUTRAL, request.scale.minimal_alpha());
    let to_rows = |rows: &[AggregatedRow]| -> Vec<ExportRow> {
        rows.iter()
            .map(|r| export_row(r, by_group.get(&r.group).cloned().unwrap_or(&neutral), pair))
            .collect()
    };

    let rankings: Vec<RankingExport> = standard_rankings(table, pair, request.top)
        .into_iter()
        .map(|r| RankingExport {
            title: r.title,
            key: option_name(r.key, &SORT_KEYS).to_string(),
            direction: format!("{:?}", r.direction).to_lowercase(),
            rows: to_rows(&r.rows),
        })
        .collect();

    let (votes_a, votes_b) = candidate_totals(&batch.records, pair);
    let frame = batch.frame.bounding_box();
    let center = batch.frame.center();
    debug!(
        "build_export: {}: {} rows, view {:?}",
        request.name,
        table.rows.len(),
        request.view
    );

    Export {
        name: request.name.clone(),
        exported_at,
        view: option_name(request.view, &VIEWS).to_string(),
        candidate_filter: option_name(request.filter.candidates, &CANDIDATE_FILTERS).to_string(),
        group_by: option_name(table.key, &AGGREGATION_KEYS).to_string(),
        zone: request.filter.zone,
        locations: request.filter.locations.clone(),
        color_by: option_name(request.color_by, &METRICS).to_string(),
        color_policy: option_name(request.color_policy, &COLOR_POLICIES).to_string(),
        candidates: [(Side::A, votes_a), (Side::B, votes_b)]
            .iter()
            .map(|(side, votes)| {
                let c = pair.candidate(*side);
                CandidateExport {
                    name: c.name.clone(),
                    label: c.label.clone(),
                    color: c.color,
                    votes: *votes,
                }
            })
            .collect(),
        empty: table.is_empty(),
        totals: BatchTotals {
            lines_read: batch.table_report.lines,
            malformed_lines: batch.table_report.malformed_lines,
            bad_votes: batch.table_report.bad_votes,
            bad_zones: batch.table_report.bad_zones,
            records_kept: batch.sanitize_report.kept,
            unrecoverable: batch.sanitize_report.unrecoverable,
            out_of_bounds: batch.sanitize_report.out_of_bounds,
            unassigned: batch.unassigned,
        },
        frame: FrameExport {
            latitude: center.latitude,
            longitude: center.longitude,
            bounds: [
                frame.min_longitude,
                frame.min_latitude,
                frame.max_longitude,
                frame.max_latitude,
            ],
        },
        available_zones: available_zones(&batch.records, pair, request.filter.candidates),
        available_locations: available_locations(
            &batch.records,
            pair,
            request.filter.candidates,
            request.filter.zone,
        ),
        rows: to_rows(&table.rows),
        points: match request.view {
            View::Points => Some(point_features(table, &colors, pair)),
            _ => None,
        },
        regions: match request.view {
            View::Regions => Some(region_features(batch, pair, request, table)),
            _ => None,
        },
        heatmap: match request.view {
            View::Heatmap => Some(heatmap_points(table, request.filter.candidates)),
            _ => None,
        },
        rankings,
        largest_places: to_rows(&largest_places(table)),
    }
}

/// A single export is written as an object, several as an array.
pub fn to_json(exports: &[Export]) -> AtlasResult<String> {
    match exports {
        [single] => serde_json::to_string_pretty(single).context(SerializingJsonSnafu {}),
        _ => serde_json::to_string_pretty(exports).context(SerializingJsonSnafu {}),
    }
}

#[derive(Serialize)]
struct FlatRow<'a> {
    name: &'a str,
    #[serde(rename = "exportedAt")]
    exported_at: String,
    view: &'a str,
    #[serde(rename = "candidateFilter")]
    candidate_filter: &'a str,
    #[serde(rename = "groupBy")]
    group_by: &'a str,
    group: &'a str,
    #[serde(rename = "votesA")]
    votes_a: u64,
    #[serde(rename = "votesB")]
    votes_b: u64,
    total: u64,
    margin: i64,
    #[serde(rename = "absMargin")]
    abs_margin: u64,
    synergy: f64,
    #[serde(rename = "synergyWeight")]
    synergy_weight: f64,
    #[serde(rename = "combinedStrength")]
    combined_strength: f64,
    leader: &'a str,
    color: &'a str,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// One line per row of every export, with the tags of the export repeated.
pub fn to_csv(exports: &[Export]) -> AtlasResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for e in exports.iter() {
        let exported_at = e.exported_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        for r in e.rows.iter() {
            wtr.serialize(FlatRow {
                name: &e.name,
                exported_at: exported_at.clone(),
                view: &e.view,
                candidate_filter: &e.candidate_filter,
                group_by: &e.group_by,
                group: &r.group,
                votes_a: r.votes_a,
                votes_b: r.votes_b,
                total: r.total,
                margin: r.margin,
                abs_margin: r.abs_margin,
                synergy: r.synergy,
                synergy_weight: r.synergy_weight,
                combined_strength: r.combined_strength,
                leader: &r.leader,
                color: &r.color,
                latitude: r.latitude,
                longitude: r.longitude,
            })
            .context(WritingCsvSnafu {})?;
        }
    }
    let bytes = match wtr.into_inner() {
        Ok(b) => b,
        Err(e) => whatever!("Error flushing the CSV export: {}", e.error()),
    };
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => whatever!("The CSV export is not valid UTF-8: {}", e),
    }
}
