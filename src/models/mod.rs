use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Columns an event table must expose before any derivation runs.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "team",
    "player",
    "location",
    "pass_end_location",
    "type",
    "pass_outcome",
    "shot_outcome",
    "shot_end_location",
    "shot_statsbomb_xg",
];

// ── Pitch coordinates ───────────────────────────────────────────────────────

/// A point in StatsBomb pitch coordinates (x along the 120 long axis, y along the 80 wide one).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.x)?;
        pair.serialize_element(&self.y)?;
        pair.end()
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // shot end locations carry a third (height) component, which is ignored
        let coords = Vec::<f64>::deserialize(deserializer)?;
        match coords.as_slice() {
            [x, y, ..] => Ok(Location::new(*x, *y)),
            _ => Err(de::Error::invalid_length(coords.len(), &"at least two coordinates")),
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

/// One flattened row of the match event log. Only the columns the metrics read are typed;
/// everything else (`id`, `minute`, `pass_height`, ...) rides along untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub pass_end_location: Option<Location>,
    #[serde(default)]
    pub pass_outcome: Option<String>,
    #[serde(default)]
    pub pass_goal_assist: Option<bool>,
    #[serde(default)]
    pub shot_outcome: Option<String>,
    #[serde(default)]
    pub shot_end_location: Option<Location>,
    #[serde(default)]
    pub shot_statsbomb_xg: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type.as_deref() == Some(event_type)
    }

    pub fn is_by(&self, player: &str) -> bool {
        self.player.as_deref() == Some(player)
    }
}

/// In-memory event log for one match. Never mutated after load, only filtered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    columns: BTreeSet<String>,
    events: Vec<Event>,
}

impl EventTable {
    pub fn new(columns: BTreeSet<String>, events: Vec<Event>) -> Self {
        Self { columns, events }
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct teams in first-seen order.
    pub fn teams(&self) -> Vec<String> {
        let mut teams: Vec<String> = Vec::new();
        for team in self.events.iter().filter_map(|e| e.team.as_ref()) {
            if !teams.contains(team) {
                teams.push(team.clone());
            }
        }
        teams
    }

    /// Distinct non-null players of `team` in first-seen order.
    pub fn players(&self, team: &str) -> Vec<String> {
        let mut players: Vec<String> = Vec::new();
        for event in self.events.iter().filter(|e| e.team.as_deref() == Some(team)) {
            if let Some(player) = &event.player {
                if !players.contains(player) {
                    players.push(player.clone());
                }
            }
        }
        players
    }

    /// Every distinct player name across both teams.
    pub fn all_players(&self) -> Vec<String> {
        self.teams().iter().flat_map(|team| self.players(team)).collect()
    }
}

// ── Selection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Passes,
    Shots,
    Heatmap,
}

impl Statistic {
    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Passes => "Passes",
            Statistic::Shots => "Shots",
            Statistic::Heatmap => "Heatmap",
        }
    }
}

/// Where the event table of a selection comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchSource {
    /// A label from the fixed match catalog.
    Catalog { label: String },
    /// A raw remote-service key.
    MatchId { id: String },
    /// An uploaded JSON document.
    Upload { document: Value },
    /// A JSON file on local disk.
    File { path: String },
}

/// Immutable input of one recomputation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub source: MatchSource,
    pub team: String,
    pub player: String,
    pub statistic: Statistic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub label: String,
    pub match_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: String,
    pub players: Vec<String>,
}

// ── Derived primitives ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PassCategory {
    Completed,
    Assist,
    Missed,
}

impl PassCategory {
    pub const ALL: [PassCategory; 3] =
        [PassCategory::Completed, PassCategory::Assist, PassCategory::Missed];

    pub fn label(&self) -> &'static str {
        match self {
            PassCategory::Completed => "Completed",
            PassCategory::Assist => "Assist",
            PassCategory::Missed => "Missed",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            PassCategory::Completed => "#3CD74A",
            PassCategory::Assist => "#F4D03F",
            PassCategory::Missed => "#F31515",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShotCategory {
    #[serde(rename = "On target")]
    OnTarget,
    Goal,
    Blocked,
    #[serde(rename = "Off target")]
    OffTarget,
}

impl ShotCategory {
    pub const ALL: [ShotCategory; 4] = [
        ShotCategory::OnTarget,
        ShotCategory::Goal,
        ShotCategory::Blocked,
        ShotCategory::OffTarget,
    ];

    /// Buckets a `shot_outcome` value; `None` for anything outside the fixed vocabulary.
    pub fn from_outcome(outcome: &str) -> Option<Self> {
        match outcome {
            "Saved" | "Saved To Post" => Some(ShotCategory::OnTarget),
            "Goal" => Some(ShotCategory::Goal),
            "Blocked" => Some(ShotCategory::Blocked),
            "Off T" | "Post" | "Wayward" | "Saved Off T" => Some(ShotCategory::OffTarget),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShotCategory::OnTarget => "On target",
            ShotCategory::Goal => "Goal",
            ShotCategory::Blocked => "Blocked",
            ShotCategory::OffTarget => "Off target",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            ShotCategory::OnTarget => "#F4D03F",
            ShotCategory::Goal => "#3CD74A",
            ShotCategory::Blocked => "#F39C12",
            ShotCategory::OffTarget => "#F31515",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: Location,
    pub end: Location,
}

impl Segment {
    pub fn is_forward(&self) -> bool {
        self.end.x > self.start.x
    }
}

/// Segments of one category, drawn together in one colour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentLayer<C> {
    pub category: C,
    pub label: &'static str,
    pub color: &'static str,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub total_completed: usize,
    pub total_missed: usize,
    pub assists: usize,
    pub pct_completed: u32,
    pub forward_completed: usize,
    pub forward_missed: usize,
    pub pct_forward_of_all: u32,
    pub pct_completed_of_forward: u32,
    /// Set when the player made no forward pass, so `pct_completed_of_forward` is a placeholder 0.
    pub forward_degenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassMap {
    pub title: String,
    pub subtitle: Option<String>,
    pub layers: Vec<SegmentLayer<PassCategory>>,
    pub summary: PassSummary,
}

impl PassMap {
    pub fn layer(&self, category: PassCategory) -> Option<&SegmentLayer<PassCategory>> {
        self.layers.iter().find(|l| l.category == category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotSummary {
    pub total_shots: usize,
    pub total_goals: usize,
    pub total_xg: f64,
    pub xg_difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotMap {
    pub title: String,
    pub subtitle: Option<String>,
    pub layers: Vec<SegmentLayer<ShotCategory>>,
    pub summary: ShotSummary,
}

impl ShotMap {
    pub fn layer(&self, category: ShotCategory) -> Option<&SegmentLayer<ShotCategory>> {
        self.layers.iter().find(|l| l.category == category)
    }
}

/// Location counts binned over the pitch, before and after smoothing.
/// Rows index y bins, columns index x bins.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub counts: DMatrix<f64>,
    pub smoothed: DMatrix<f64>,
}

impl DensityGrid {
    pub fn bins(&self) -> (usize, usize) {
        (self.counts.ncols(), self.counts.nrows())
    }

    pub fn max_density(&self) -> f64 {
        self.smoothed.iter().cloned().fold(0.0, f64::max)
    }
}

fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().cloned().collect())
        .collect()
}

impl Serialize for DensityGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut grid = serializer.serialize_struct("DensityGrid", 4)?;
        grid.serialize_field("x_range", &self.x_range)?;
        grid.serialize_field("y_range", &self.y_range)?;
        grid.serialize_field("counts", &matrix_rows(&self.counts))?;
        grid.serialize_field("smoothed", &matrix_rows(&self.smoothed))?;
        grid.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub title: String,
    pub subtitle: Option<String>,
    pub located_events: usize,
    pub grid: DensityGrid,
}

/// A headline number shown above the pitch, e.g. "Completed passes: 6/10 (60%)".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
    pub delta: Option<String>,
}

impl Metric {
    pub fn new(label: &str, value: String) -> Self {
        Self {
            label: label.to_string(),
            value,
            delta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "statistic", rename_all = "snake_case")]
pub enum DerivedBundle {
    Passes(PassMap),
    Shots(ShotMap),
    Heatmap(Heatmap),
}

impl DerivedBundle {
    pub fn title(&self) -> &str {
        match self {
            DerivedBundle::Passes(m) => &m.title,
            DerivedBundle::Shots(m) => &m.title,
            DerivedBundle::Heatmap(m) => &m.title,
        }
    }

    pub fn subtitle(&self) -> Option<&str> {
        match self {
            DerivedBundle::Passes(m) => m.subtitle.as_deref(),
            DerivedBundle::Shots(m) => m.subtitle.as_deref(),
            DerivedBundle::Heatmap(m) => m.subtitle.as_deref(),
        }
    }
}

/// What `/analysis` returns: the bundle plus its display metrics.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub cycle_id: Uuid,
    pub team: String,
    pub player: String,
    pub events_loaded: usize,
    pub metrics: Vec<Metric>,
    pub bundle: DerivedBundle,
    pub generated_at: DateTime<Utc>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String, kind: &'static str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: Some(kind),
            timestamp: Utc::now(),
        }
    }
}
