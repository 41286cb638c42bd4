// Primitives for reading the vote table.

use log::{debug, info, warn};
use snafu::prelude::*;

use vote_synergy::*;

use crate::atlas::config_reader::ColumnNames;
use crate::atlas::*;

/// Counters of the table reader. The lines dropped here never reach the
/// coordinate repair.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct TableReport {
    pub lines: usize,
    pub malformed_lines: usize,
    pub bad_votes: usize,
    pub bad_zones: usize,
}

struct ColumnIndices {
    candidate: usize,
    location: usize,
    zone: usize,
    votes: usize,
    latitude: usize,
    longitude: usize,
}

impl ColumnIndices {
    /// The number of fields a line needs to hold every used column.
    fn width(&self) -> usize {
        [
            self.candidate,
            self.location,
            self.zone,
            self.votes,
            self.latitude,
            self.longitude,
        ]
        .iter()
        .max()
        .map_or(0, |i| i + 1)
    }
}

fn clean_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_string()
}

// Index columns and blank header cells left by spreadsheet exports.
fn is_dropped_column(name: &str) -> bool {
    name.is_empty() || name.starts_with("Unnamed")
}

fn column_index(headers: &[(usize, String)], column: &str, path: &str) -> AtlasResult<usize> {
    headers
        .iter()
        .find(|(_, h)| h == column)
        .map(|(i, _)| *i)
        .context(MissingColumnSnafu { column, path })
}

/// Reads a non-negative integer. Integral floats ("12.0") are accepted.
fn parse_count(token: &str) -> Option<u64> {
    let t = token.trim();
    t.parse::<u64>().ok().or_else(|| {
        t.parse::<f64>()
            .ok()
            .filter(|x| x.is_finite() && *x >= 0.0 && x.fract() == 0.0 && *x < u64::MAX as f64)
            .map(|x| x as u64)
    })
}

/// Reads the semicolon-separated vote table.
///
/// `path` is only used for the messages. Lines too short to hold every used
/// column and lines with an unreadable vote count or zone are skipped and
/// counted. Missing trailing cells of unused columns are fine.
pub fn read_vote_table(
    path: &str,
    contents: &str,
    columns: &ColumnNames,
) -> AtlasResult<(Vec<RawVoteRecord>, TableReport)> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let headers = rdr.headers().context(CsvHeaderSnafu { path })?.clone();
    let kept: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, clean_header(h)))
        .filter(|(_, h)| !is_dropped_column(h))
        .collect();
    debug!("read_vote_table: {}: columns {:?}", path, kept);

    let idx = ColumnIndices {
        candidate: column_index(&kept, &columns.candidate, path)?,
        location: column_index(&kept, &columns.location, path)?,
        zone: column_index(&kept, &columns.zone, path)?,
        votes: column_index(&kept, &columns.votes, path)?,
        latitude: column_index(&kept, &columns.latitude, path)?,
        longitude: column_index(&kept, &columns.longitude, path)?,
    };
    let width = idx.width();

    let mut report = TableReport::default();
    let mut res: Vec<RawVoteRecord> = Vec::new();
    for (i, line_r) in rdr.records().enumerate() {
        // The header is line 1.
        let lineno = i + 2;
        report.lines += 1;
        let line = match line_r {
            Ok(line) if line.len() >= width => line,
            Ok(line) => {
                warn!(
                    "read_vote_table: {}: skipping line {}: {} fields, the columns need {}",
                    path,
                    lineno,
                    line.len(),
                    width
                );
                report.malformed_lines += 1;
                continue;
            }
            Err(e) => {
                warn!("read_vote_table: {}: skipping line {}: {}", path, lineno, e);
                report.malformed_lines += 1;
                continue;
            }
        };
        let votes = match parse_count(&line[idx.votes]) {
            Some(v) => v,
            None => {
                debug!(
                    "read_vote_table: line {}: bad vote count {:?}",
                    lineno,
                    &line[idx.votes]
                );
                report.bad_votes += 1;
                continue;
            }
        };
        let zone = match parse_count(&line[idx.zone]).and_then(|z| u32::try_from(z).ok()) {
            Some(z) => z,
            None => {
                debug!(
                    "read_vote_table: line {}: bad zone {:?}",
                    lineno,
                    &line[idx.zone]
                );
                report.bad_zones += 1;
                continue;
            }
        };
        res.push(RawVoteRecord {
            candidate: line[idx.candidate].trim().to_string(),
            location: line[idx.location].trim().to_string(),
            zone,
            votes,
            raw_latitude: line[idx.latitude].to_string(),
            raw_longitude: line[idx.longitude].to_string(),
        });
    }
    info!(
        "read_vote_table: {}: {} records from {} lines ({} malformed, {} bad vote counts, {} bad zones)",
        path,
        res.len(),
        report.lines,
        report.malformed_lines,
        report.bad_votes,
        report.bad_zones
    );
    Ok((res, report))
}
