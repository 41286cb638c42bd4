use clap::Parser;

/// Maps where two candidates compete, from polling place tallies.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file. The other options override the values it contains.
    /// Relative paths inside the file are resolved against its directory.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The semicolon-separated vote table.
    #[clap(long, value_parser)]
    pub votes: Option<String>,

    /// (file path) GeoJSON layer of the municipalities. Only used to frame the map.
    #[clap(long, value_parser)]
    pub municipalities: Option<String>,

    /// (file path) GeoJSON layer of the neighborhoods the polling places are assigned to.
    #[clap(long, value_parser)]
    pub neighborhoods: Option<String>,

    /// (default 'Rio de Janeiro') The municipality to frame in the municipality layer.
    #[clap(long, value_parser)]
    pub municipality_name: Option<String>,

    /// The name of the first tracked candidate, as it appears in the vote table.
    #[clap(long, value_parser)]
    pub candidate_a: Option<String>,

    /// The name of the second tracked candidate, as it appears in the vote table.
    #[clap(long, value_parser)]
    pub candidate_b: Option<String>,

    /// (comparative, both, only-a or only-b; default comparative) Which records take part in the analysis.
    #[clap(long, value_parser)]
    pub mode: Option<String>,

    /// (polling-place, zone or region; default polling-place) The dimension the votes are grouped by.
    #[clap(long, value_parser)]
    pub group_by: Option<String>,

    /// If specified, only keeps the polling places of this electoral zone.
    #[clap(long, value_parser)]
    pub zone: Option<u32>,

    /// (repeatable) If specified, only keeps these polling places.
    #[clap(long, value_parser)]
    pub location: Vec<String>,

    /// (points, regions or heatmap; default points) The map layer to export.
    #[clap(long, value_parser)]
    pub view: Option<String>,

    /// (synergy, absolute-synergy, victory-magnitude, combined-strength, total-votes or synergy-weight;
    /// default synergy, total-votes in the single candidate modes) The metric that drives the
    /// color intensity.
    #[clap(long, value_parser)]
    pub color_by: Option<String>,

    /// (linear or percentile; default linear) How the metric becomes an alpha value.
    #[clap(long, value_parser)]
    pub color_policy: Option<String>,

    /// (default 10) The number of rows of each ranking.
    #[clap(long, value_parser)]
    pub top: Option<usize>,

    /// (json or csv; default json) The format of the export.
    #[clap(long, value_parser)]
    pub format: Option<String>,

    /// (file path, 'stdout' or empty) Where the export is written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference JSON export. If provided, voteatlas checks that the aggregated rows
    /// match the ones of the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
