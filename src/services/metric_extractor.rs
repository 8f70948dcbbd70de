use crate::error::AnalysisError;
use crate::models::{
    DensityGrid, DerivedBundle, Event, EventTable, Heatmap, Location, Metric, PassCategory,
    PassMap, PassSummary, Segment, SegmentLayer, ShotCategory, ShotMap, ShotSummary, Statistic,
};
use crate::services::density::{bin_counts, gaussian_filter, PITCH_X_RANGE, PITCH_Y_RANGE};
use crate::utils::{closest_name, format_delta, format_ratio, percentage, round_to};

/// Turns an event table into render-ready primitives for one player.
pub struct MetricExtractor {
    bins: (usize, usize),
    sigma: f64,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self {
            bins: (25, 25),
            sigma: 1.0,
        }
    }

    pub fn derive(
        &self,
        statistic: Statistic,
        player: &str,
        table: &EventTable,
        team: &str,
        match_label: Option<&str>,
    ) -> Result<DerivedBundle, AnalysisError> {
        match statistic {
            Statistic::Passes => self
                .pass_map(player, table, team, match_label)
                .map(DerivedBundle::Passes),
            Statistic::Shots => self
                .shot_map(player, table, team, match_label)
                .map(DerivedBundle::Shots),
            Statistic::Heatmap => self
                .heatmap(player, table, team, match_label)
                .map(DerivedBundle::Heatmap),
        }
    }

    /// Pass segments by category plus completion and forward-play numbers.
    ///
    /// An assisting pass is drawn in the Assist layer and, being outcome-null, also counts
    /// as Completed. Totals and forward counts only look at Completed and Missed.
    pub fn pass_map(
        &self,
        player: &str,
        table: &EventTable,
        team: &str,
        match_label: Option<&str>,
    ) -> Result<PassMap, AnalysisError> {
        ensure_player(player, table)?;

        let mut completed = Vec::new();
        let mut assist = Vec::new();
        let mut missed = Vec::new();
        let mut dropped = 0usize;

        for event in table.events().iter().filter(|e| e.is_type("Pass") && e.is_by(player)) {
            let (Some(start), Some(end)) = (event.location, event.pass_end_location) else {
                dropped += 1;
                continue;
            };
            let segment = Segment { start, end };

            if event.pass_goal_assist == Some(true) {
                assist.push(segment);
            }
            if event.pass_outcome.is_none() {
                completed.push(segment);
            } else {
                missed.push(segment);
            }
        }

        if dropped > 0 {
            tracing::debug!("Dropped {} passes of {} without coordinates", dropped, player);
        }

        let total_completed = completed.len();
        let total_missed = missed.len();
        let total = total_completed + total_missed;

        let pct_completed =
            percentage(total_completed, total).ok_or_else(|| AnalysisError::InsufficientData {
                player: player.to_string(),
                reason: "no completed or missed passes".to_string(),
            })?;

        let forward_completed = completed.iter().filter(|s| s.is_forward()).count();
        let forward_missed = missed.iter().filter(|s| s.is_forward()).count();
        let forward_total = forward_completed + forward_missed;
        let pct_forward_of_all = percentage(forward_total, total).unwrap_or(0);
        let forward_degenerate = forward_total == 0;
        let pct_completed_of_forward = percentage(forward_completed, forward_total).unwrap_or(0);

        if forward_degenerate {
            tracing::warn!("{} made no forward passes; forward completion reported as 0", player);
        }

        let summary = PassSummary {
            total_completed,
            total_missed,
            assists: assist.len(),
            pct_completed,
            forward_completed,
            forward_missed,
            pct_forward_of_all,
            pct_completed_of_forward,
            forward_degenerate,
        };

        tracing::debug!(
            "Passes of {}: completed={} missed={} assists={}",
            player,
            total_completed,
            total_missed,
            summary.assists
        );

        let layers = PassCategory::ALL
            .into_iter()
            .zip([completed, assist, missed])
            .map(|(category, segments)| SegmentLayer {
                category,
                label: category.label(),
                color: category.color(),
                segments,
            })
            .collect();

        Ok(PassMap {
            title: format!("Passes of {} ({})", player, team),
            subtitle: match_label.map(str::to_string),
            layers,
            summary,
        })
    }

    /// Shot segments by outcome bucket plus goals against expected goals.
    pub fn shot_map(
        &self,
        player: &str,
        table: &EventTable,
        team: &str,
        match_label: Option<&str>,
    ) -> Result<ShotMap, AnalysisError> {
        ensure_player(player, table)?;

        let shots: Vec<(usize, &Event)> = table
            .events()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_type("Shot") && e.is_by(player))
            .collect();

        let mut layers: Vec<SegmentLayer<ShotCategory>> = ShotCategory::ALL
            .iter()
            .map(|category| SegmentLayer {
                category: *category,
                label: category.label(),
                color: category.color(),
                segments: Vec::new(),
            })
            .collect();

        let mut total_goals = 0usize;
        let mut total_xg = 0.0;

        for (row, event) in &shots {
            let outcome = event.shot_outcome.as_deref();
            let category = outcome
                .and_then(ShotCategory::from_outcome)
                .ok_or_else(|| AnalysisError::UnknownOutcome {
                    value: outcome.unwrap_or("null").to_string(),
                    row: *row,
                })?;

            if category == ShotCategory::Goal {
                total_goals += 1;
            }
            total_xg += event.shot_statsbomb_xg.unwrap_or(0.0);

            match (event.location, event.shot_end_location) {
                (Some(start), Some(end)) => {
                    if let Some(layer) = layers.iter_mut().find(|l| l.category == category) {
                        layer.segments.push(Segment { start, end });
                    }
                }
                _ => tracing::warn!("Shot at row {} has no coordinates, not drawn", row),
            }
        }

        let summary = ShotSummary {
            total_shots: shots.len(),
            total_goals,
            total_xg,
            xg_difference: total_goals as f64 - total_xg,
        };

        tracing::debug!(
            "Shots of {}: {} shots, {} goals, xG {:.2}",
            player,
            summary.total_shots,
            total_goals,
            total_xg
        );

        Ok(ShotMap {
            title: format!("Shots of {} ({})", player, team),
            subtitle: match_label.map(str::to_string),
            layers,
            summary,
        })
    }

    /// Smoothed location density of every located event of the player.
    pub fn heatmap(
        &self,
        player: &str,
        table: &EventTable,
        team: &str,
        match_label: Option<&str>,
    ) -> Result<Heatmap, AnalysisError> {
        ensure_player(player, table)?;

        let points: Vec<Location> = table
            .events()
            .iter()
            .filter(|e| e.is_by(player))
            .filter_map(|e| e.location)
            .collect();

        let counts = bin_counts(&points, self.bins, PITCH_X_RANGE, PITCH_Y_RANGE);
        let smoothed = gaussian_filter(&counts, self.sigma);

        tracing::debug!("Heatmap of {}: {} located events", player, points.len());

        Ok(Heatmap {
            title: format!("Heatmap of {} ({})", player, team),
            subtitle: match_label.map(str::to_string),
            located_events: points.len(),
            grid: DensityGrid {
                x_range: PITCH_X_RANGE,
                y_range: PITCH_Y_RANGE,
                counts,
                smoothed,
            },
        })
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_player(player: &str, table: &EventTable) -> Result<(), AnalysisError> {
    if table.events().iter().any(|e| e.is_by(player)) {
        return Ok(());
    }
    let known = table.all_players();
    Err(AnalysisError::no_events(player, closest_name(player, &known)))
}

/// Headline numbers shown next to the figure.
pub fn display_metrics(bundle: &DerivedBundle) -> Vec<Metric> {
    match bundle {
        DerivedBundle::Passes(map) => {
            let s = &map.summary;
            let total = s.total_completed + s.total_missed;
            let forward_total = s.forward_completed + s.forward_missed;
            vec![
                Metric::new(
                    "Completed passes",
                    format_ratio(s.total_completed, total, s.pct_completed),
                ),
                Metric::new(
                    "Completed forward passes",
                    format_ratio(s.forward_completed, forward_total, s.pct_completed_of_forward),
                ),
                Metric::new("Forward play", format!("{}%", s.pct_forward_of_all)),
            ]
        }
        DerivedBundle::Shots(map) => {
            let s = &map.summary;
            vec![
                Metric::new("Goals", s.total_goals.to_string()),
                Metric {
                    delta: Some(format_delta(s.xg_difference)),
                    ..Metric::new("Expected goals (xG)", format!("{:.2}", round_to(s.total_xg, 2)))
                },
            ]
        }
        DerivedBundle::Heatmap(map) => {
            vec![Metric::new("Located events", map.located_events.to_string())]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::REQUIRED_COLUMNS;
    use std::collections::BTreeSet;

    const PLAYER: &str = "Pedri";
    const TEAM: &str = "Barcelona";

    fn table(events: Vec<Event>) -> EventTable {
        let columns: BTreeSet<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        EventTable::new(columns, events)
    }

    fn pass(start: (f64, f64), end: (f64, f64), outcome: Option<&str>, assist: bool) -> Event {
        Event {
            team: Some(TEAM.to_string()),
            player: Some(PLAYER.to_string()),
            event_type: Some("Pass".to_string()),
            location: Some(Location::new(start.0, start.1)),
            pass_end_location: Some(Location::new(end.0, end.1)),
            pass_outcome: outcome.map(str::to_string),
            pass_goal_assist: assist.then_some(true),
            ..Default::default()
        }
    }

    fn shot(outcome: &str, xg: f64) -> Event {
        Event {
            team: Some(TEAM.to_string()),
            player: Some(PLAYER.to_string()),
            event_type: Some("Shot".to_string()),
            location: Some(Location::new(105.0, 40.0)),
            shot_end_location: Some(Location::new(120.0, 38.0)),
            shot_outcome: Some(outcome.to_string()),
            shot_statsbomb_xg: Some(xg),
            ..Default::default()
        }
    }

    fn ten_passes() -> Vec<Event> {
        vec![
            pass((30.0, 40.0), (50.0, 40.0), None, false),
            pass((30.0, 40.0), (20.0, 40.0), None, false),
            pass((40.0, 30.0), (60.0, 20.0), None, false),
            pass((50.0, 40.0), (45.0, 60.0), None, false),
            pass((60.0, 40.0), (60.0, 10.0), None, false),
            pass((100.0, 30.0), (110.0, 38.0), None, true),
            pass((70.0, 40.0), (90.0, 40.0), Some("Incomplete"), false),
            pass((70.0, 40.0), (60.0, 40.0), Some("Out"), false),
            pass((80.0, 40.0), (100.0, 20.0), Some("Incomplete"), false),
            pass((20.0, 40.0), (10.0, 40.0), Some("Pass Offside"), false),
        ]
    }

    #[test]
    fn test_pass_map_completion_scenario() {
        let map = MetricExtractor::new()
            .pass_map(PLAYER, &table(ten_passes()), TEAM, Some("Barcelona - Huesca 4:1 (Round 27)"))
            .unwrap();
        let s = &map.summary;
        assert_eq!(s.total_completed, 6);
        assert_eq!(s.total_missed, 4);
        assert_eq!(s.pct_completed, 60);
        assert_eq!(s.assists, 1);
        assert_eq!(map.layer(PassCategory::Assist).unwrap().segments.len(), 1);
        assert_eq!(map.layer(PassCategory::Completed).unwrap().segments.len(), 6);
        assert_eq!(map.title, "Passes of Pedri (Barcelona)");
        assert_eq!(map.subtitle.as_deref(), Some("Barcelona - Huesca 4:1 (Round 27)"));
    }

    #[test]
    fn test_pass_map_forward_play() {
        let map = MetricExtractor::new()
            .pass_map(PLAYER, &table(ten_passes()), TEAM, None)
            .unwrap();
        let s = &map.summary;
        // completed forward: (30->50), (40->60), (100->110); missed forward: (70->90), (80->100)
        assert_eq!(s.forward_completed, 3);
        assert_eq!(s.forward_missed, 2);
        assert_eq!(s.pct_forward_of_all, 50);
        assert_eq!(s.pct_completed_of_forward, 60);
        assert!(!s.forward_degenerate);
    }

    #[test]
    fn test_pass_map_drops_passes_without_coordinates() {
        let mut events = ten_passes();
        events.push(Event {
            pass_end_location: None,
            ..pass((1.0, 1.0), (2.0, 2.0), Some("Incomplete"), false)
        });
        let map = MetricExtractor::new().pass_map(PLAYER, &table(events), TEAM, None).unwrap();
        assert_eq!(map.summary.total_missed, 4);
    }

    #[test]
    fn test_pass_map_without_passes_is_insufficient() {
        let events = vec![shot("Goal", 0.5)];
        let err = MetricExtractor::new().pass_map(PLAYER, &table(events), TEAM, None).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_pass_map_zero_forward_passes() {
        let events = vec![
            pass((50.0, 40.0), (40.0, 40.0), None, false),
            pass((50.0, 40.0), (50.0, 60.0), Some("Incomplete"), false),
        ];
        let s = MetricExtractor::new()
            .pass_map(PLAYER, &table(events), TEAM, None)
            .unwrap()
            .summary;
        assert_eq!(s.pct_completed, 50);
        assert_eq!(s.pct_forward_of_all, 0);
        assert_eq!(s.pct_completed_of_forward, 0);
        assert!(s.forward_degenerate);
    }

    #[test]
    fn test_pass_category_depends_only_on_outcome_and_assist() {
        let events = vec![
            pass((10.0, 10.0), (20.0, 20.0), Some("Incomplete"), true),
            pass((90.0, 70.0), (20.0, 20.0), Some("Incomplete"), false),
        ];
        let map = MetricExtractor::new().pass_map(PLAYER, &table(events), TEAM, None).unwrap();
        assert_eq!(map.layer(PassCategory::Assist).unwrap().segments.len(), 1);
        assert_eq!(map.layer(PassCategory::Missed).unwrap().segments.len(), 2);
        assert_eq!(map.layer(PassCategory::Completed).unwrap().segments.len(), 0);
        assert_eq!(map.summary.pct_completed, 0);
    }

    #[test]
    fn test_shot_map_scenario() {
        let events = vec![
            shot("Goal", 0.8),
            shot("Saved", 0.3),
            shot("Blocked", 0.1),
            shot("Off T", 0.05),
        ];
        let map = MetricExtractor::new().shot_map(PLAYER, &table(events), TEAM, None).unwrap();
        let s = &map.summary;
        assert_eq!(s.total_goals, 1);
        assert!((s.total_xg - 1.25).abs() < 1e-9);
        assert!((s.xg_difference + 0.25).abs() < 1e-9);
        for category in ShotCategory::ALL {
            assert_eq!(map.layer(category).unwrap().segments.len(), 1, "{:?}", category);
        }
        assert_eq!(map.title, "Shots of Pedri (Barcelona)");
    }

    #[test]
    fn test_shot_map_empty_set() {
        let events = vec![pass((10.0, 10.0), (20.0, 20.0), None, false)];
        let s = MetricExtractor::new()
            .shot_map(PLAYER, &table(events), TEAM, None)
            .unwrap()
            .summary;
        assert_eq!(s.total_shots, 0);
        assert_eq!(s.total_goals, 0);
        assert_eq!(s.total_xg, 0.0);
        assert_eq!(s.xg_difference, 0.0);
    }

    #[test]
    fn test_shot_map_unknown_outcome() {
        let mut missing = shot("Goal", 0.2);
        missing.shot_outcome = None;
        let events = vec![shot("Goal", 0.4), shot("Penalty Missed", 0.7), missing];

        let err = MetricExtractor::new()
            .shot_map(PLAYER, &table(events.clone()), TEAM, None)
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UnknownOutcome {
                value: "Penalty Missed".to_string(),
                row: 1
            }
        );

        let err = MetricExtractor::new()
            .shot_map(PLAYER, &table(vec![events[2].clone()]), TEAM, None)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::UnknownOutcome { ref value, row: 0 } if value == "null"
        ));
    }

    #[test]
    fn test_shot_without_coordinates_counts_but_is_not_drawn() {
        let mut blind = shot("Goal", 0.6);
        blind.location = None;
        blind.shot_end_location = None;
        let map = MetricExtractor::new().shot_map(PLAYER, &table(vec![blind]), TEAM, None).unwrap();
        assert_eq!(map.summary.total_goals, 1);
        assert!(map.layer(ShotCategory::Goal).unwrap().segments.is_empty());
    }

    #[test]
    fn test_heatmap_counts_located_events() {
        let mut events = ten_passes();
        events.push(Event {
            player: Some(PLAYER.to_string()),
            event_type: Some("Ball Receipt*".to_string()),
            ..Default::default()
        });
        events.push(Event {
            player: Some("Messi".to_string()),
            location: Some(Location::new(100.0, 40.0)),
            ..Default::default()
        });

        let map = MetricExtractor::new().heatmap(PLAYER, &table(events), TEAM, None).unwrap();
        assert_eq!(map.located_events, 10);
        assert_eq!(map.grid.counts.sum(), 10.0);
        assert!((map.grid.smoothed.sum() - 10.0).abs() < 1e-9);
        assert_eq!(map.grid.bins(), (25, 25));
        assert!(map.grid.max_density() <= 10.0);
    }

    #[test]
    fn test_unknown_player_for_every_statistic() {
        let events = ten_passes();
        let extractor = MetricExtractor::new();
        for statistic in [Statistic::Passes, Statistic::Shots, Statistic::Heatmap] {
            let err = extractor
                .derive(statistic, "pedri", &table(events.clone()), TEAM, None)
                .unwrap_err();
            assert_eq!(err, AnalysisError::no_events("pedri", Some(PLAYER.to_string())));
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let t = table(ten_passes());
        let extractor = MetricExtractor::new();
        let first = extractor.derive(Statistic::Passes, PLAYER, &t, TEAM, None).unwrap();
        let second = extractor.derive(Statistic::Passes, PLAYER, &t, TEAM, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_display_metrics() {
        let extractor = MetricExtractor::new();
        let passes = extractor
            .derive(Statistic::Passes, PLAYER, &table(ten_passes()), TEAM, None)
            .unwrap();
        let metrics = display_metrics(&passes);
        assert_eq!(metrics[0].value, "6/10 (60%)");
        assert_eq!(metrics[1].value, "3/5 (60%)");
        assert_eq!(metrics[2].value, "50%");

        let shots = vec![
            shot("Goal", 0.8),
            shot("Saved", 0.3),
            shot("Blocked", 0.1),
            shot("Off T", 0.05),
        ];
        let bundle = extractor.derive(Statistic::Shots, PLAYER, &table(shots), TEAM, None).unwrap();
        let metrics = display_metrics(&bundle);
        assert_eq!(metrics[0].value, "1");
        assert_eq!(metrics[1].value, "1.25");
        assert_eq!(metrics[1].delta.as_deref(), Some("-0.25"));
    }
}
