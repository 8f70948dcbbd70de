use chrono::Utc;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::models::{
    AnalysisReport, DerivedBundle, EventTable, MatchSource, Selection, TeamRoster,
    REQUIRED_COLUMNS,
};
use crate::services::event_store::{label_for_match_id, validate, EventStore};
use crate::services::metric_extractor::{display_metrics, MetricExtractor};
use crate::services::render::{render_png, Figure};
use crate::utils::closest_name;

/// One selection cycle: load → validate → derive. Holds no state between calls.
pub struct AnalysisPipeline {
    store: EventStore,
    extractor: MetricExtractor,
}

impl AnalysisPipeline {
    pub fn new() -> Self {
        Self::with_store(EventStore::new())
    }

    pub fn with_store(store: EventStore) -> Self {
        Self {
            store,
            extractor: MetricExtractor::new(),
        }
    }

    /// Load and validate the event table of a source.
    pub async fn load(&self, source: &MatchSource) -> Result<EventTable, AnalysisError> {
        let table = self.store.load(source).await?;
        validate(&table, &REQUIRED_COLUMNS)?;
        Ok(table)
    }

    /// Teams of a source with the players who appear for each.
    pub async fn rosters(&self, source: &MatchSource) -> Result<Vec<TeamRoster>, AnalysisError> {
        let table = self.load(source).await?;
        Ok(rosters(&table))
    }

    pub async fn run(
        &self,
        selection: &Selection,
    ) -> Result<(EventTable, DerivedBundle), AnalysisError> {
        tracing::info!(
            "Analysing {} of {} ({})",
            selection.statistic.label(),
            selection.player,
            selection.team
        );

        let table = self.load(&selection.source).await?;
        let bundle = self.derive(selection, &table)?;
        Ok((table, bundle))
    }

    /// Derive the bundle for a selection from an already loaded table.
    pub fn derive(
        &self,
        selection: &Selection,
        table: &EventTable,
    ) -> Result<DerivedBundle, AnalysisError> {
        let players = table.players(&selection.team);
        if !players.contains(&selection.player) {
            tracing::warn!("{} does not appear for {}", selection.player, selection.team);
            return Err(AnalysisError::no_events(
                &selection.player,
                closest_name(&selection.player, &players),
            ));
        }

        let label = match_label(&selection.source);
        self.extractor.derive(
            selection.statistic,
            &selection.player,
            table,
            &selection.team,
            label.as_deref(),
        )
    }

    pub async fn report(&self, selection: &Selection) -> Result<AnalysisReport, AnalysisError> {
        let (table, bundle) = self.run(selection).await?;
        Ok(build_report(selection, &table, bundle))
    }

    /// Run the cycle and encode the figure as PNG.
    pub async fn render(&self, selection: &Selection) -> anyhow::Result<(AnalysisReport, Vec<u8>)> {
        let report = self.report(selection).await?;
        let png = render_png(&Figure::from_bundle(&report.bundle))?;
        Ok((report, png))
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rosters(table: &EventTable) -> Vec<TeamRoster> {
    table
        .teams()
        .into_iter()
        .map(|team| TeamRoster {
            players: table.players(&team),
            team,
        })
        .collect()
}

/// Figure subtitle for a source, when it names a known match.
pub fn match_label(source: &MatchSource) -> Option<String> {
    match source {
        MatchSource::Catalog { label } => Some(label.clone()),
        MatchSource::MatchId { id } => label_for_match_id(id).map(str::to_string),
        MatchSource::Upload { .. } | MatchSource::File { .. } => None,
    }
}

pub fn build_report(
    selection: &Selection,
    table: &EventTable,
    bundle: DerivedBundle,
) -> AnalysisReport {
    AnalysisReport {
        cycle_id: Uuid::new_v4(),
        team: selection.team.clone(),
        player: selection.player.clone(),
        events_loaded: table.len(),
        metrics: display_metrics(&bundle),
        bundle,
        generated_at: Utc::now(),
    }
}
