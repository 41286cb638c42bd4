// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// One line of the vote table, as read from the file.
///
/// The coordinates are kept as the raw tokens of the input: they are frequently
/// malformed and only become numbers after going through [`crate::coords`].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawVoteRecord {
    pub candidate: String,
    pub location: String,
    pub zone: u32,
    pub votes: u64,
    pub raw_latitude: String,
    pub raw_longitude: String,
}

/// A vote record with finite coordinates inside the plausible bounding box.
#[derive(PartialEq, Debug, Clone)]
pub struct SanitizedVoteRecord {
    pub candidate: String,
    pub location: String,
    pub zone: u32,
    pub votes: u64,
    pub latitude: f64,
    pub longitude: f64,
}

/// A sanitized record after the spatial join.
///
/// `region` is `None` when the point intersects no region. These records are
/// kept and aggregate into [`GroupValue::Unassigned`].
#[derive(PartialEq, Debug, Clone)]
pub struct AssignedVoteRecord {
    pub record: SanitizedVoteRecord,
    pub region: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    /// The name as it appears in the candidate column of the vote table.
    pub name: String,
    /// A short name for tooltips and legends.
    pub label: String,
    pub color: [u8; 3],
}

/// The two tracked candidates.
///
/// Margin and synergy are intrinsically binary, so the pair is fixed for the
/// whole pipeline. Records of any other candidate are ignored by the sums.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidatePair {
    pub a: Candidate,
    pub b: Candidate,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Side {
    A,
    B,
}

impl CandidatePair {
    pub const DEFAULT_COLOR_A: [u8; 3] = [0, 128, 0];
    pub const DEFAULT_COLOR_B: [u8; 3] = [255, 165, 0];

    pub fn new(name_a: &str, name_b: &str) -> CandidatePair {
        CandidatePair {
            a: Candidate {
                name: name_a.to_string(),
                label: name_a.to_string(),
                color: CandidatePair::DEFAULT_COLOR_A,
            },
            b: Candidate {
                name: name_b.to_string(),
                label: name_b.to_string(),
                color: CandidatePair::DEFAULT_COLOR_B,
            },
        }
    }

    pub fn side(&self, candidate_name: &str) -> Option<Side> {
        if candidate_name == self.a.name {
            Some(Side::A)
        } else if candidate_name == self.b.name {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn candidate(&self, side: Side) -> &Candidate {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// Latitude/longitude limits a repaired coordinate must fall into.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    pub fn padded(&self, degrees: f64) -> BoundingBox {
        BoundingBox {
            min_latitude: self.min_latitude - degrees,
            max_latitude: self.max_latitude + degrees,
            min_longitude: self.min_longitude - degrees,
            max_longitude: self.max_longitude + degrees,
        }
    }

    pub fn is_valid(&self) -> bool {
        [
            self.min_latitude,
            self.max_latitude,
            self.min_longitude,
            self.max_longitude,
        ]
        .iter()
        .all(|x| x.is_finite())
            && self.min_latitude <= self.max_latitude
            && self.min_longitude <= self.max_longitude
    }
}

/// Where the decimal point goes back when a token only parses after
/// stripping everything but its digits.
///
/// Runs strictly longer than `long_run_threshold` digits get the point after
/// `long_run_split` digits, the other runs after `short_run_split` digits.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DigitRepair {
    pub long_run_threshold: usize,
    pub long_run_split: usize,
    pub short_run_split: usize,
}

impl DigitRepair {
    pub const DEFAULT: DigitRepair = DigitRepair {
        long_run_threshold: 7,
        long_run_split: 2,
        short_run_split: 3,
    };
}

impl Default for DigitRepair {
    fn default() -> Self {
        DigitRepair::DEFAULT
    }
}

/// Counters of the sanitization step.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct SanitizeReport {
    pub read: usize,
    pub kept: usize,
    pub unrecoverable: usize,
    pub out_of_bounds: usize,
}

// ********* Aggregation **********

/// The dimension records are grouped by.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum AggregationKey {
    PollingPlace,
    Zone,
    Region,
}

/// The value of a group.
///
/// The derived order puts all the named groups first (sorted by name) and the
/// unassigned bucket last.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum GroupValue {
    Named(String),
    Unassigned,
}

impl Display for GroupValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupValue::Named(name) => write!(f, "{}", name),
            GroupValue::Unassigned => write!(f, "Unassigned"),
        }
    }
}

/// Which candidates' records take part in the aggregation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum CandidateFilter {
    /// Only the polling places where both tracked candidates have records.
    Comparative,
    /// All the records.
    Both,
    OnlyA,
    OnlyB,
}

impl CandidateFilter {
    pub fn is_single_candidate(&self) -> bool {
        matches!(self, CandidateFilter::OnlyA | CandidateFilter::OnlyB)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RecordFilter {
    pub candidates: CandidateFilter,
    pub zone: Option<u32>,
    /// Polling place names to keep. An empty list keeps all of them.
    pub locations: Vec<String>,
}

impl RecordFilter {
    pub fn new(candidates: CandidateFilter) -> RecordFilter {
        RecordFilter {
            candidates,
            zone: None,
            locations: Vec::new(),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Per-group sums, before any metric is derived.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupSums {
    pub group: GroupValue,
    pub votes_a: u64,
    pub votes_b: u64,
    pub record_count: usize,
    /// Mean position of the records of the group.
    pub position: Option<GeoPosition>,
}

// ******** Output data structures *********

#[derive(PartialEq, Debug, Clone)]
pub struct AggregatedRow {
    pub group: GroupValue,
    pub votes_a: u64,
    pub votes_b: u64,
    pub total: u64,
    pub margin: i64,
    pub abs_margin: u64,
    pub relative_imbalance: f64,
    pub synergy: f64,
    pub synergy_weight: f64,
    pub combined_strength: f64,
    pub record_count: usize,
    pub position: Option<GeoPosition>,
}

/// The result of one filter request. Rows are in group order.
#[derive(PartialEq, Debug, Clone)]
pub struct AggregatedTable {
    pub key: AggregationKey,
    pub rows: Vec<AggregatedRow>,
    pub max_total: u64,
}

impl AggregatedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, group: &GroupValue) -> Option<&AggregatedRow> {
        self.rows.iter().find(|r| r.group == *group)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Leader {
    A,
    B,
    Neither,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const NEUTRAL: [u8; 3] = [128, 128, 128];

    pub fn from_rgb(rgb: [u8; 3], alpha: u8) -> Rgba {
        Rgba {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
            a: alpha,
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// The scalar a color intensity is derived from.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum MetricKind {
    /// Closeness relative to the group's own total.
    Synergy,
    /// Closeness relative to the largest absolute margin of the batch.
    AbsoluteSynergy,
    /// Absolute margin.
    VictoryMagnitude,
    CombinedStrength,
    TotalVotes,
    SynergyWeight,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SortKey {
    VotesA,
    VotesB,
    Total,
    Margin,
    AbsMargin,
    Synergy,
    CombinedStrength,
    SynergyWeight,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SortDirection {
    Highest,
    Lowest,
}

/// Errors raised when building the configurable parts of the pipeline.
#[derive(PartialEq, Debug, Clone)]
pub enum SynergyError {
    InvalidColorScale(String),
    InvalidBoundingBox(BoundingBox),
}

impl Error for SynergyError {}

impl Display for SynergyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynergyError::InvalidColorScale(msg) => write!(f, "invalid color scale: {}", msg),
            SynergyError::InvalidBoundingBox(bb) => write!(f, "invalid bounding box: {:?}", bb),
        }
    }
}
