use anyhow::{anyhow, Result};
use clap::Args;
use std::path::Path;

use crate::models::{DerivedBundle, MatchSource, Selection, Statistic};
use crate::services::{catalog, to_records_json, AnalysisPipeline, MATCH_CATALOG};

/// Where to read match events from. Defaults to the first catalog match.
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct SourceArgs {
    /// Match label from the catalog (see `pitchview matches`)
    #[arg(long)]
    pub game: Option<String>,
    /// Raw event-service match id
    #[arg(long)]
    pub match_id: Option<String>,
    /// Local JSON file of event records
    #[arg(long)]
    pub file: Option<String>,
}

impl SourceArgs {
    pub fn to_source(&self) -> MatchSource {
        if let Some(path) = &self.file {
            MatchSource::File { path: path.clone() }
        } else if let Some(id) = &self.match_id {
            MatchSource::MatchId { id: id.clone() }
        } else {
            let label = self.game.clone().unwrap_or_else(|| MATCH_CATALOG[0].0.to_string());
            MatchSource::Catalog { label }
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Team the player plays for
    #[arg(short, long)]
    pub team: String,
    /// Player name as it appears in the events
    #[arg(short, long)]
    pub player: String,
    /// Statistic to derive
    #[arg(short, long, value_enum, default_value = "passes")]
    pub stat: Statistic,
}

impl SelectionArgs {
    pub fn to_selection(&self) -> Selection {
        Selection {
            source: self.source.to_source(),
            team: self.team.clone(),
            player: self.player.clone(),
            statistic: self.stat,
        }
    }
}

pub fn list_matches() -> Result<()> {
    println!("⚽ Available matches:\n");
    for info in catalog() {
        println!("   • {} (id {})", info.label, info.match_id);
    }
    println!("\n💡 Use 'pitchview players --game \"<label>\"' to list teams and players");
    Ok(())
}

pub async fn list_players(source: &SourceArgs) -> Result<()> {
    let pipeline = AnalysisPipeline::new();
    let rosters = pipeline.rosters(&source.to_source()).await?;

    for roster in rosters {
        println!("📋 {} ({} players):", roster.team, roster.players.len());
        for player in roster.players {
            println!("   • {}", player);
        }
        println!();
    }
    Ok(())
}

pub async fn analyze(args: &SelectionArgs, json: bool, csv_path: Option<&str>) -> Result<()> {
    let pipeline = AnalysisPipeline::new();
    let report = pipeline.report(&args.to_selection()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("📊 {}", report.bundle.title());
        if let Some(subtitle) = report.bundle.subtitle() {
            println!("   {}", subtitle);
        }
        println!();
        for metric in &report.metrics {
            match &metric.delta {
                Some(delta) => println!("   {}: {} ({})", metric.label, metric.value, delta),
                None => println!("   {}: {}", metric.label, metric.value),
            }
        }
        if let DerivedBundle::Passes(map) = &report.bundle {
            if map.summary.forward_degenerate {
                println!("\n⚠️  No forward passes: forward completion shown as 0%");
            }
        }
    }

    if let Some(path) = csv_path {
        write_csv(&report.bundle, path)?;
        println!("\n💾 Wrote {}", path);
    }

    Ok(())
}

pub async fn render(args: &SelectionArgs, out: &str) -> Result<()> {
    let pipeline = AnalysisPipeline::new();
    let (report, png) = pipeline.render(&args.to_selection()).await?;

    tokio::fs::write(out, &png).await?;
    println!("🖼️  {} → {} ({} bytes)", report.bundle.title(), out, png.len());
    for metric in &report.metrics {
        println!("   {}: {}", metric.label, metric.value);
    }
    Ok(())
}

pub async fn export_events(source: &SourceArgs, out: &str) -> Result<()> {
    let pipeline = AnalysisPipeline::new();
    let table = pipeline.load(&source.to_source()).await?;

    let json = to_records_json(&table)?;
    if let Some(parent) = Path::new(out).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(out, json).await?;

    println!("💾 Exported {} events ({} columns) to {}", table.len(), table.columns().len(), out);
    Ok(())
}

/// One row per segment (pass/shot maps) or per grid cell (heatmap).
pub fn write_csv(bundle: &DerivedBundle, path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    match bundle {
        DerivedBundle::Passes(map) => {
            writer.write_record(["category", "start_x", "start_y", "end_x", "end_y"])?;
            for layer in &map.layers {
                for s in &layer.segments {
                    writer.write_record(&segment_record(layer.label, s))?;
                }
            }
        }
        DerivedBundle::Shots(map) => {
            writer.write_record(["category", "start_x", "start_y", "end_x", "end_y"])?;
            for layer in &map.layers {
                for s in &layer.segments {
                    writer.write_record(&segment_record(layer.label, s))?;
                }
            }
        }
        DerivedBundle::Heatmap(map) => {
            writer.write_record(["row", "col", "count", "smoothed"])?;
            let (x_bins, y_bins) = map.grid.bins();
            for row in 0..y_bins {
                for col in 0..x_bins {
                    writer.write_record(&[
                        row.to_string(),
                        col.to_string(),
                        map.grid.counts[(row, col)].to_string(),
                        map.grid.smoothed[(row, col)].to_string(),
                    ])?;
                }
            }
        }
    }

    writer.flush().map_err(|e| anyhow!("failed to write {}: {}", path, e))?;
    Ok(())
}

fn segment_record(label: &str, s: &crate::models::Segment) -> [String; 5] {
    [
        label.to_string(),
        s.start.x.to_string(),
        s.start.y.to_string(),
        s.end.x.to_string(),
        s.end.y.to_string(),
    ]
}
