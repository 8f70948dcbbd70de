use thiserror::Error;

/// Failures that end a selection cycle. Nothing here is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Match data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Failed to read JSON file. The file format might be incorrect. Error: {0}")]
    MalformedInput(String),

    #[error("Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Not enough data for {player}: {reason}")]
    InsufficientData { player: String, reason: String },

    #[error("Unknown shot outcome '{value}' at row {row}")]
    UnknownOutcome { value: String, row: usize },

    #[error("No events for player '{player}'{}", suggestion_hint(.suggestion))]
    NoEventsForPlayer {
        player: String,
        suggestion: Option<String>,
    },
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map_or(String::new(), |name| format!(" (did you mean '{}'?)", name))
}

impl AnalysisError {
    pub fn no_events(player: &str, suggestion: Option<String>) -> Self {
        Self::NoEventsForPlayer {
            player: player.to_string(),
            suggestion,
        }
    }

    /// Short machine-readable tag, used in API payloads and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) => "data_unavailable",
            Self::MalformedInput(_) => "malformed_input",
            Self::MissingColumns(_) => "missing_columns",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::UnknownOutcome { .. } => "unknown_outcome",
            Self::NoEventsForPlayer { .. } => "no_events_for_player",
        }
    }
}
