use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use vote_synergy::color::ColorScale;
use vote_synergy::*;

use crate::args::Args;
use crate::atlas::io_common::*;
use crate::atlas::*;

// ********* The configuration file **********

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub name: String,
    pub label: Option<String>,
    pub color: Option<[u8; 3]>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatesConfig {
    pub a: Option<CandidateConfig>,
    pub b: Option<CandidateConfig>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub votes: Option<String>,
    pub municipalities: Option<String>,
    pub neighborhoods: Option<String>,
    #[serde(rename = "municipalityName")]
    pub municipality_name: Option<String>,
    #[serde(rename = "municipalityNameProperty")]
    pub municipality_name_property: Option<String>,
    #[serde(rename = "regionNameProperty")]
    pub region_name_property: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnsConfig {
    pub candidate: Option<String>,
    pub location: Option<String>,
    pub zone: Option<String>,
    pub votes: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BoundsConfig {
    #[serde(rename = "minLatitude")]
    pub min_latitude: f64,
    #[serde(rename = "maxLatitude")]
    pub max_latitude: f64,
    #[serde(rename = "minLongitude")]
    pub min_longitude: f64,
    #[serde(rename = "maxLongitude")]
    pub max_longitude: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigitRepairConfig {
    #[serde(rename = "longRunThreshold")]
    pub long_run_threshold: Option<usize>,
    #[serde(rename = "longRunSplit")]
    pub long_run_split: Option<usize>,
    #[serde(rename = "shortRunSplit")]
    pub short_run_split: Option<usize>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColorScaleConfig {
    pub exponent: Option<f64>,
    #[serde(rename = "baseAlpha")]
    pub base_alpha: Option<u8>,
    pub breakpoints: Option<Vec<f64>>,
    pub ladder: Option<Vec<u8>>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    pub name: Option<String>,
    pub mode: Option<String>,
    #[serde(rename = "groupBy")]
    pub group_by: Option<String>,
    pub zone: Option<u32>,
    pub locations: Option<Vec<String>>,
    pub view: Option<String>,
    #[serde(rename = "colorBy")]
    pub color_by: Option<String>,
    #[serde(rename = "colorPolicy")]
    pub color_policy: Option<String>,
    pub top: Option<usize>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: Option<String>,
    pub path: Option<String>,
    pub reference: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    pub candidates: Option<CandidatesConfig>,
    pub sources: Option<SourcesConfig>,
    pub columns: Option<ColumnsConfig>,
    pub bounds: Option<BoundsConfig>,
    #[serde(rename = "digitRepair")]
    pub digit_repair: Option<DigitRepairConfig>,
    #[serde(rename = "colorScale")]
    pub color_scale: Option<ColorScaleConfig>,
    pub requests: Option<Vec<RequestConfig>>,
    pub output: Option<OutputConfig>,
}

pub fn read_config(path: &str) -> AtlasResult<AtlasConfig> {
    let contents = fs::read_to_string(path).context(OpeningSourceSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

// ********* Resolved settings **********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum View {
    Points,
    Regions,
    Heatmap,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ColorPolicyKind {
    Linear,
    Percentile,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnNames {
    pub candidate: String,
    pub location: String,
    pub zone: String,
    pub votes: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            candidate: "NM_VOTAVEL".to_string(),
            location: "NM_LOCAL_VOTACAO".to_string(),
            zone: "NR_ZONA".to_string(),
            votes: "QT_VOTOS_TOTAL".to_string(),
            latitude: "LATITUDE".to_string(),
            longitude: "LONGITUDE".to_string(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Sources {
    pub votes: String,
    pub municipalities: String,
    pub neighborhoods: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LayerSettings {
    pub municipality_name: String,
    pub municipality_name_property: String,
    pub region_name_property: String,
}

impl Default for LayerSettings {
    fn default() -> Self {
        LayerSettings {
            municipality_name: "Rio de Janeiro".to_string(),
            municipality_name_property: "name".to_string(),
            region_name_property: "nome".to_string(),
        }
    }
}

/// Everything the loaded batch depends on, besides the content of the sources.
#[derive(PartialEq, Debug, Clone)]
pub struct LoadSettings {
    pub columns: ColumnNames,
    pub layers: LayerSettings,
    pub bounds: Option<BoundingBox>,
    pub digit_repair: DigitRepair,
}

/// One filter request against the loaded batch.
#[derive(PartialEq, Debug, Clone)]
pub struct Request {
    pub name: String,
    pub key: AggregationKey,
    pub filter: RecordFilter,
    pub view: View,
    pub color_by: MetricKind,
    pub color_policy: ColorPolicyKind,
    pub scale: ColorScale,
    pub top: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub pair: CandidatePair,
    pub sources: Sources,
    pub load: LoadSettings,
    pub requests: Vec<Request>,
    pub format: OutputFormat,
    pub out: Option<String>,
    pub reference: Option<String>,
}

pub const DEFAULT_TOP: usize = 10;

fn candidate(
    side: &str,
    from_args: &Option<String>,
    from_config: &Option<CandidateConfig>,
    default_color: [u8; 3],
) -> AtlasResult<Candidate> {
    let name = from_args
        .clone()
        .or_else(|| from_config.as_ref().map(|c| c.name.clone()))
        .context(MissingSettingSnafu {
            what: format!("name of candidate {}", side),
        })?;
    let label = from_config
        .as_ref()
        .and_then(|c| c.label.clone())
        .unwrap_or_else(|| name.clone());
    let color = from_config
        .as_ref()
        .and_then(|c| c.color)
        .unwrap_or(default_color);
    Ok(Candidate { name, label, color })
}

fn color_scale(policy: ColorPolicyKind, cfg: &ColorScaleConfig) -> AtlasResult<ColorScale> {
    let scale = match policy {
        ColorPolicyKind::Linear => ColorScale::linear(
            cfg.exponent.unwrap_or(ColorScale::DEFAULT_EXPONENT),
            cfg.base_alpha.unwrap_or(ColorScale::DEFAULT_BASE_ALPHA),
        ),
        ColorPolicyKind::Percentile => ColorScale::percentile(
            cfg.breakpoints
                .as_deref()
                .unwrap_or(&ColorScale::DEFAULT_BREAKPOINTS),
            cfg.ladder.as_deref().unwrap_or(&ColorScale::DEFAULT_LADDER),
        ),
    };
    scale.context(ScaleSnafu {})
}

/// Builds a request: the command line wins over the configuration file.
fn request(
    args: &Args,
    cfg: &RequestConfig,
    scale_cfg: &ColorScaleConfig,
    default_name: &str,
) -> AtlasResult<Request> {
    let mode = args.mode.clone().or_else(|| cfg.mode.clone());
    let candidates = match mode {
        Some(m) => parse_option("mode", &m, &CANDIDATE_FILTERS)?,
        None => CandidateFilter::Comparative,
    };
    let key = match args.group_by.clone().or_else(|| cfg.group_by.clone()) {
        Some(g) => parse_option("group-by", &g, &AGGREGATION_KEYS)?,
        None => AggregationKey::PollingPlace,
    };
    let view = match args.view.clone().or_else(|| cfg.view.clone()) {
        Some(v) => parse_option("view", &v, &VIEWS)?,
        None => View::Points,
    };
    let color_by = match args.color_by.clone().or_else(|| cfg.color_by.clone()) {
        Some(c) => parse_option("color-by", &c, &METRICS)?,
        // Synergy is flat when one of the two sides is filtered out.
        None if candidates.is_single_candidate() => MetricKind::TotalVotes,
        None => MetricKind::Synergy,
    };
    let color_policy = match args.color_policy.clone().or_else(|| cfg.color_policy.clone()) {
        Some(c) => parse_option("color-policy", &c, &COLOR_POLICIES)?,
        None => ColorPolicyKind::Linear,
    };
    let locations = if args.location.is_empty() {
        cfg.locations.clone().unwrap_or_default()
    } else {
        args.location.clone()
    };
    Ok(Request {
        name: cfg.name.clone().unwrap_or_else(|| default_name.to_string()),
        key,
        filter: RecordFilter {
            candidates,
            zone: args.zone.or(cfg.zone),
            locations,
        },
        view,
        color_by,
        color_policy,
        scale: color_scale(color_policy, scale_cfg)?,
        top: args.top.or(cfg.top).unwrap_or(DEFAULT_TOP),
    })
}

/// Merges the command line with the configuration file, if any.
pub fn resolve(args: &Args) -> AtlasResult<Settings> {
    match &args.config {
        Some(path) => {
            let config = read_config(path)?;
            debug!("config: {:?}", config);
            resolve_settings(args, &config, Path::new(path).parent())
        }
        None => resolve_settings(args, &AtlasConfig::default(), None),
    }
}

/// `root` is the directory relative paths of the configuration are resolved
/// against.
pub fn resolve_settings(
    args: &Args,
    config: &AtlasConfig,
    root: Option<&Path>,
) -> AtlasResult<Settings> {
    let candidates = config.candidates.clone().unwrap_or_default();
    let pair = CandidatePair {
        a: candidate(
            "A",
            &args.candidate_a,
            &candidates.a,
            CandidatePair::DEFAULT_COLOR_A,
        )?,
        b: candidate(
            "B",
            &args.candidate_b,
            &candidates.b,
            CandidatePair::DEFAULT_COLOR_B,
        )?,
    };
    if pair.a.name == pair.b.name {
        whatever!("The two tracked candidates must differ: {}", pair.a.name)
    }

    let sources_cfg = config.sources.clone().unwrap_or_default();
    let source = |from_args: &Option<String>, from_config: &Option<String>, what: &str| {
        match (from_args, from_config) {
            (Some(p), _) => Ok(p.clone()),
            (None, Some(p)) => Ok(resolve_path(root, p)),
            (None, None) => MissingSettingSnafu { what }.fail(),
        }
    };
    let sources = Sources {
        votes: source(&args.votes, &sources_cfg.votes, "vote table")?,
        municipalities: source(
            &args.municipalities,
            &sources_cfg.municipalities,
            "municipality layer",
        )?,
        neighborhoods: source(
            &args.neighborhoods,
            &sources_cfg.neighborhoods,
            "neighborhood layer",
        )?,
    };

    let default_layers = LayerSettings::default();
    let layers = LayerSettings {
        municipality_name: args
            .municipality_name
            .clone()
            .or_else(|| sources_cfg.municipality_name.clone())
            .unwrap_or(default_layers.municipality_name),
        municipality_name_property: sources_cfg
            .municipality_name_property
            .clone()
            .unwrap_or(default_layers.municipality_name_property),
        region_name_property: sources_cfg
            .region_name_property
            .clone()
            .unwrap_or(default_layers.region_name_property),
    };

    let columns_cfg = config.columns.clone().unwrap_or_default();
    let default_columns = ColumnNames::default();
    let columns = ColumnNames {
        candidate: columns_cfg.candidate.unwrap_or(default_columns.candidate),
        location: columns_cfg.location.unwrap_or(default_columns.location),
        zone: columns_cfg.zone.unwrap_or(default_columns.zone),
        votes: columns_cfg.votes.unwrap_or(default_columns.votes),
        latitude: columns_cfg.latitude.unwrap_or(default_columns.latitude),
        longitude: columns_cfg.longitude.unwrap_or(default_columns.longitude),
    };

    let bounds = match &config.bounds {
        Some(b) => {
            let bb = BoundingBox {
                min_latitude: b.min_latitude,
                max_latitude: b.max_latitude,
                min_longitude: b.min_longitude,
                max_longitude: b.max_longitude,
            };
            if !bb.is_valid() {
                return Err(SynergyError::InvalidBoundingBox(bb)).context(ScaleSnafu {});
            }
            Some(bb)
        }
        None => None,
    };

    let repair_cfg = config.digit_repair.clone().unwrap_or_default();
    let digit_repair = DigitRepair {
        long_run_threshold: repair_cfg
            .long_run_threshold
            .unwrap_or(DigitRepair::DEFAULT.long_run_threshold),
        long_run_split: repair_cfg
            .long_run_split
            .unwrap_or(DigitRepair::DEFAULT.long_run_split),
        short_run_split: repair_cfg
            .short_run_split
            .unwrap_or(DigitRepair::DEFAULT.short_run_split),
    };

    let scale_cfg = config.color_scale.clone().unwrap_or_default();
    let default_name = simplify_file_name(&sources.votes);
    let request_cfgs = match &config.requests {
        Some(rs) if !rs.is_empty() => rs.clone(),
        _ => vec![RequestConfig::default()],
    };
    let mut requests: Vec<Request> = Vec::new();
    for (idx, cfg) in request_cfgs.iter().enumerate() {
        let name = if request_cfgs.len() > 1 {
            format!("{}-{}", default_name, idx + 1)
        } else {
            default_name.clone()
        };
        requests.push(request(args, cfg, &scale_cfg, &name)?);
    }

    let output_cfg = config.output.clone().unwrap_or_default();
    let format = match args.format.clone().or(output_cfg.format) {
        Some(f) => parse_option("format", &f, &FORMATS)?,
        None => OutputFormat::Json,
    };
    let out = match (&args.out, &output_cfg.path) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) if p == "stdout" => Some(p.clone()),
        (None, Some(p)) => Some(resolve_path(root, p)),
        (None, None) => None,
    };
    let reference = match (&args.reference, &output_cfg.reference) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(p)) => Some(resolve_path(root, p)),
        (None, None) => None,
    };

    info!(
        "resolve_settings: candidates {:?} / {:?}, {} requests",
        pair.a.name,
        pair.b.name,
        requests.len()
    );
    Ok(Settings {
        pair,
        sources,
        load: LoadSettings {
            columns,
            layers,
            bounds,
            digit_repair,
        },
        requests,
        format,
        out,
        reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut v = vec!["voteatlas"];
        v.extend_from_slice(extra);
        Args::parse_from(v)
    }

    fn config() -> AtlasConfig {
        serde_json::from_str(
            r#"{
                "candidates": {
                    "a": {"name": "ALICE SILVA", "label": "Alice", "color": [0, 0, 255]},
                    "b": {"name": "BOB SOUZA"}
                },
                "sources": {
                    "votes": "votes.csv",
                    "municipalities": "/geo/municipalities.geojson",
                    "neighborhoods": "neighborhoods.geojson"
                },
                "columns": {"votes": "QT_VOTOS"},
                "digitRepair": {"shortRunSplit": 2},
                "colorScale": {"ladder": [0, 10, 20, 40, 80, 160, 255]},
                "requests": [
                    {"mode": "both", "groupBy": "region", "view": "regions"},
                    {"colorBy": "combined-strength", "colorPolicy": "percentile", "zone": 4}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn config_file() {
        let s = resolve_settings(&args(&[]), &config(), Some(Path::new("/data"))).unwrap();
        assert_eq!(s.pair.a.name, "ALICE SILVA");
        assert_eq!(s.pair.a.label, "Alice");
        assert_eq!(s.pair.a.color, [0, 0, 255]);
        assert_eq!(s.pair.b.label, "BOB SOUZA");
        assert_eq!(s.pair.b.color, CandidatePair::DEFAULT_COLOR_B);
        assert_eq!(s.sources.votes, "/data/votes.csv");
        assert_eq!(s.sources.municipalities, "/geo/municipalities.geojson");
        assert_eq!(s.load.columns.votes, "QT_VOTOS");
        assert_eq!(s.load.columns.zone, "NR_ZONA");
        assert_eq!(s.load.layers, LayerSettings::default());
        assert_eq!(s.load.digit_repair.short_run_split, 2);
        assert_eq!(s.load.digit_repair.long_run_threshold, 7);
        assert_eq!(s.requests.len(), 2);
        assert_eq!(s.requests[0].name, "votes-1");
        assert_eq!(s.requests[0].key, AggregationKey::Region);
        assert_eq!(s.requests[0].view, View::Regions);
        assert_eq!(s.requests[0].filter.candidates, CandidateFilter::Both);
        assert_eq!(s.requests[1].filter.candidates, CandidateFilter::Comparative);
        assert_eq!(s.requests[1].filter.zone, Some(4));
        assert_eq!(s.requests[1].color_by, MetricKind::CombinedStrength);
        assert_eq!(s.requests[1].scale.minimal_alpha(), 0);
        assert_eq!(s.requests[1].top, DEFAULT_TOP);
        assert_eq!(s.format, OutputFormat::Json);
    }

    #[test]
    fn command_line_wins() {
        let a = args(&[
            "--candidate-a",
            "CAROL",
            "--votes",
            "other.csv",
            "--mode",
            "only-b",
            "--location",
            "ESCOLA A",
            "--location",
            "ESCOLA B",
            "--top",
            "3",
            "--format",
            "csv",
        ]);
        let s = resolve_settings(&a, &config(), Some(Path::new("/data"))).unwrap();
        assert_eq!(s.pair.a.name, "CAROL");
        assert_eq!(s.sources.votes, "other.csv");
        assert!(s
            .requests
            .iter()
            .all(|r| r.filter.candidates == CandidateFilter::OnlyB && r.top == 3));
        assert_eq!(s.requests[0].filter.locations, vec!["ESCOLA A", "ESCOLA B"]);
        assert_eq!(s.format, OutputFormat::Csv);
        // Single candidate requests are colored by volume unless told otherwise
        assert_eq!(s.requests[0].color_by, MetricKind::TotalVotes);
        assert_eq!(s.requests[1].color_by, MetricKind::CombinedStrength);

        let a = args(&["--mode", "only-a", "--color-by", "synergy-weight"]);
        let s = resolve_settings(&a, &config(), Some(Path::new("/data"))).unwrap();
        assert!(s
            .requests
            .iter()
            .all(|r| r.color_by == MetricKind::SynergyWeight));
    }

    #[test]
    fn defaults_without_a_config_file() {
        let a = args(&[
            "--candidate-a",
            "ALICE",
            "--candidate-b",
            "BOB",
            "--votes",
            "v.csv",
            "--municipalities",
            "m.geojson",
            "--neighborhoods",
            "n.geojson",
        ]);
        let s = resolve_settings(&a, &AtlasConfig::default(), None).unwrap();
        assert_eq!(s.requests.len(), 1);
        let r = &s.requests[0];
        assert_eq!(r.name, "v");
        assert_eq!(r.key, AggregationKey::PollingPlace);
        assert_eq!(r.filter, RecordFilter::new(CandidateFilter::Comparative));
        assert_eq!(r.view, View::Points);
        assert_eq!(r.scale, ColorScale::default_linear());
        assert_eq!(s.load.columns, ColumnNames::default());
        assert_eq!(s.load.bounds, None);
        assert_eq!(s.out, None);
    }

    #[test]
    fn invalid_settings() {
        let missing = resolve_settings(&args(&["--candidate-a", "ALICE"]), &AtlasConfig::default(), None);
        assert!(matches!(missing, Err(AtlasError::MissingSetting { .. })));

        let same = resolve_settings(
            &args(&["--candidate-a", "BOB SOUZA"]),
            &config(),
            None,
        );
        assert!(same.is_err());

        let bad_mode = resolve_settings(&args(&["--mode", "all"]), &config(), None);
        assert!(matches!(bad_mode, Err(AtlasError::InvalidOption { .. })));

        let mut cfg = config();
        cfg.color_scale = Some(ColorScaleConfig {
            ladder: Some(vec![10, 20]),
            ..ColorScaleConfig::default()
        });
        let bad_ladder = resolve_settings(&args(&["--color-policy", "percentile"]), &cfg, None);
        assert!(matches!(bad_ladder, Err(AtlasError::Scale { .. })));

        let mut cfg = config();
        cfg.bounds = Some(BoundsConfig {
            min_latitude: -22.0,
            max_latitude: -23.0,
            min_longitude: -44.0,
            max_longitude: -43.0,
        });
        assert!(matches!(
            resolve_settings(&args(&[]), &cfg, None),
            Err(AtlasError::Scale { .. })
        ));
    }
}
