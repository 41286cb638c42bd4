use log::{debug, info, warn};

use vote_synergy::cache::{fingerprint, LoadCache};
use vote_synergy::coords::sanitize_records;
use vote_synergy::spatial::{assign_regions, MapFrame, Region, RegionSet};
use vote_synergy::*;

use snafu::prelude::*;

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Polygon};
use lazy_static::lazy_static;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::atlas::config_reader::*;
use crate::atlas::io_csv::TableReport;
use crate::atlas::io_export::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_export;
mod io_geojson;

#[derive(Debug, Snafu)]
pub enum AtlasError {
    #[snafu(display("Error opening file {path}"))]
    OpeningSource {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading the header of {path}"))]
    CsvHeader { source: csv::Error, path: String },
    #[snafu(display("Missing column {column} in {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Error parsing JSON in {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid GeoJSON in {path}: {reason}"))]
    InvalidGeoJson { path: String, reason: String },
    #[snafu(display("Unsupported coordinate reference {crs} in {path}"))]
    UnsupportedCrs { crs: String, path: String },
    #[snafu(display("Municipality {name} not found in {path}"))]
    MunicipalityNotFound { name: String, path: String },
    #[snafu(display("No named region in {path}"))]
    EmptyRegionLayer { path: String },
    #[snafu(display("Missing setting: {what}"))]
    MissingSetting { what: String },
    #[snafu(display("Invalid value {value:?} for option {option}"))]
    InvalidOption { option: String, value: String },
    #[snafu(display("Invalid configuration: {source}"))]
    Scale { source: SynergyError },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing the CSV export"))]
    WritingCsv { source: csv::Error },
    #[snafu(display("Error serializing the export"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Difference detected between the export and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type AtlasResult<T> = Result<T, AtlasError>;

/// A loaded, sanitized and assigned batch. Shared by all the requests.
#[derive(Debug)]
pub struct LoadedBatch {
    pub records: Vec<AssignedVoteRecord>,
    pub regions: RegionSet,
    pub frame: MapFrame,
    /// The box the coordinates were checked against.
    pub bounds: BoundingBox,
    pub table_report: TableReport,
    pub sanitize_report: SanitizeReport,
    pub unassigned: usize,
}

lazy_static! {
    static ref LOAD_CACHE: LoadCache<LoadedBatch> = LoadCache::new();
}

fn read_source(path: &str) -> AtlasResult<String> {
    info!("Attempting to read {:?}", path);
    fs::read_to_string(path).context(OpeningSourceSnafu { path })
}

fn build_batch(
    sources: &Sources,
    load: &LoadSettings,
    votes: &str,
    municipalities: &str,
    neighborhoods: &str,
) -> AtlasResult<LoadedBatch> {
    let (raws, table_report) = io_csv::read_vote_table(&sources.votes, votes, &load.columns)?;

    let municipality_layer = io_geojson::read_layer(
        &sources.municipalities,
        municipalities,
        &load.layers.municipality_name_property,
    )?;
    let outline: Vec<Polygon<f64>> = municipality_layer
        .features
        .into_iter()
        .filter(|f| f.name.as_deref() == Some(load.layers.municipality_name.as_str()))
        .flat_map(|f| f.geometry.0)
        .collect();
    let frame = MapFrame::from_outline(MultiPolygon::new(outline)).context(
        MunicipalityNotFoundSnafu {
            name: load.layers.municipality_name.clone(),
            path: sources.municipalities.clone(),
        },
    )?;

    let region_layer = io_geojson::read_layer(
        &sources.neighborhoods,
        neighborhoods,
        &load.layers.region_name_property,
    )?;
    let mut regions: Vec<Region> = Vec::new();
    for f in region_layer.features.into_iter() {
        match f.name {
            Some(name) => regions.push(Region {
                name,
                geometry: f.geometry,
            }),
            None => warn!(
                "build_batch: skipping a region without {:?} property",
                load.layers.region_name_property
            ),
        }
    }
    ensure!(
        !regions.is_empty(),
        EmptyRegionLayerSnafu {
            path: sources.neighborhoods.clone()
        }
    );
    let regions = RegionSet::new(regions);

    let bounds = match load.bounds {
        Some(b) => b,
        None => frame.bounding_box().padded(0.25),
    };
    debug!("build_batch: bounding box {:?}", bounds);
    let (sanitized, sanitize_report) = sanitize_records(&raws, &load.digit_repair, &bounds);
    info!(
        "build_batch: kept {} of {} records ({} unrecoverable coordinates, {} out of bounds)",
        sanitize_report.kept,
        sanitize_report.read,
        sanitize_report.unrecoverable,
        sanitize_report.out_of_bounds
    );
    let (records, unassigned) = assign_regions(sanitized, &regions);

    Ok(LoadedBatch {
        records,
        regions,
        frame,
        bounds,
        table_report,
        sanitize_report,
        unassigned,
    })
}

/// Loads a batch, or returns the cached one if the sources and the settings
/// did not change.
pub fn load_batch(sources: &Sources, load: &LoadSettings) -> AtlasResult<Arc<LoadedBatch>> {
    let votes = read_source(&sources.votes)?;
    let municipalities = read_source(&sources.municipalities)?;
    let neighborhoods = read_source(&sources.neighborhoods)?;
    let settings = format!("{:?}", load);
    let key = fingerprint(&[&votes, &municipalities, &neighborhoods, &settings]);
    debug!("load_batch: fingerprint {}", key);
    LOAD_CACHE.get_or_load(&key, || {
        build_batch(sources, load, &votes, &municipalities, &neighborhoods)
    })
}

pub fn run_request(
    batch: &LoadedBatch,
    pair: &CandidatePair,
    request: &Request,
    exported_at: DateTime<Utc>,
) -> Export {
    let table = build_table(&batch.records, pair, request.key, &request.filter);
    build_export(batch, pair, request, &table, exported_at)
}

pub fn run_requests(settings: &Settings, exported_at: DateTime<Utc>) -> AtlasResult<Vec<Export>> {
    let batch = load_batch(&settings.sources, &settings.load)?;
    Ok(settings
        .requests
        .iter()
        .map(|r| run_request(&batch, &settings.pair, r, exported_at))
        .collect())
}

fn write_output(out: Option<&str>, rendered: &str) -> AtlasResult<()> {
    match out {
        None | Some("") | Some("stdout") => {
            println!("{}", rendered);
        }
        Some(path) => {
            fs::write(path, rendered).context(WritingOutputSnafu { path })?;
            info!("Export written to {:?}", path);
        }
    }
    Ok(())
}

/// The rows of each export of a payload. Everything else (timestamps, layers)
/// is left out of the comparison.
fn payload_rows(payload: &JSValue) -> JSValue {
    match payload {
        JSValue::Array(exports) => JSValue::Array(exports.iter().map(|e| e["rows"].clone()).collect()),
        single => JSValue::Array(vec![single["rows"].clone()]),
    }
}

fn check_reference(path: &str, exports: &[Export]) -> AtlasResult<()> {
    let contents = read_source(path)?;
    let reference: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    // Same printing and parsing path as the reference file.
    let computed_str = serde_json::to_string(exports).context(SerializingJsonSnafu {})?;
    let computed: JSValue =
        serde_json::from_str(computed_str.as_str()).context(SerializingJsonSnafu {})?;

    let pretty_reference =
        serde_json::to_string_pretty(&payload_rows(&reference)).context(SerializingJsonSnafu {})?;
    let pretty_computed =
        serde_json::to_string_pretty(&payload_rows(&computed)).context(SerializingJsonSnafu {})?;
    if pretty_reference != pretty_computed {
        warn!("Found differences with the reference {:?}", path);
        print_diff(pretty_reference.as_str(), pretty_computed.as_str(), "\n");
        return ReferenceMismatchSnafu { path }.fail();
    }
    info!("check_reference: the export matches {:?}", path);
    Ok(())
}

pub fn run(args: &Args) -> AtlasResult<()> {
    let settings = resolve(args)?;
    debug!("settings: {:?}", settings);
    let exports = run_requests(&settings, Utc::now())?;
    for e in exports.iter() {
        info!(
            "{}: {} rows, {} {} by {}",
            e.name,
            e.rows.len(),
            e.view,
            e.candidate_filter,
            e.group_by
        );
    }
    let rendered = match settings.format {
        OutputFormat::Json => to_json(&exports)?,
        OutputFormat::Csv => to_csv(&exports)?,
    };
    write_output(settings.out.as_deref(), &rendered)?;

    // The reference export, if provided for comparison
    if let Some(reference) = &settings.reference {
        check_reference(reference, &exports)?;
    }
    Ok(())
}
