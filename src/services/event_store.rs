use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::Path;

use crate::error::AnalysisError;
use crate::models::{Event, EventTable, MatchInfo, MatchSource};

const DEFAULT_OPEN_DATA_URL: &str =
    "https://raw.githubusercontent.com/statsbomb/open-data/master/data";

/// Known matches offered in the match selector, label → remote event key.
pub const MATCH_CATALOG: [(&str, &str); 2] = [
    ("Barcelona - Huesca 4:1 (Round 27)", "3773369"),
    ("Barcelona - Real Madrid 1:3 (Round 7)", "3773585"),
];

pub fn catalog() -> Vec<MatchInfo> {
    MATCH_CATALOG
        .iter()
        .map(|(label, id)| MatchInfo {
            label: label.to_string(),
            match_id: id.to_string(),
        })
        .collect()
}

/// Remote key for a catalog label.
pub fn match_id_for_label(label: &str) -> Result<&'static str, AnalysisError> {
    MATCH_CATALOG
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, id)| *id)
        .ok_or_else(|| AnalysisError::DataUnavailable(format!("unknown match '{}'", label)))
}

/// Catalog label for a remote key, used as the figure subtitle.
pub fn label_for_match_id(match_id: &str) -> Option<&'static str> {
    MATCH_CATALOG
        .iter()
        .find(|(_, id)| *id == match_id)
        .map(|(label, _)| *label)
}

// ── EventStore ───────────────────────────────────────────────────────────────

pub struct EventStore {
    client: Client,
    base_url: String,
}

impl EventStore {
    pub fn new() -> Self {
        let base_url = env::var("STATSBOMB_OPEN_DATA_URL")
            .unwrap_or_else(|_| DEFAULT_OPEN_DATA_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn events_url(&self, match_id: &str) -> String {
        format!("{}/events/{}.json", self.base_url, match_id)
    }

    /// Load the event table for any selection source. Does not validate columns.
    pub async fn load(&self, source: &MatchSource) -> Result<EventTable, AnalysisError> {
        match source {
            MatchSource::Catalog { label } => {
                let match_id = match_id_for_label(label)?;
                self.fetch_match(match_id).await
            }
            MatchSource::MatchId { id } => self.fetch_match(id).await,
            MatchSource::Upload { document } => parse_document(document.clone()),
            MatchSource::File { path } => load_file(path).await,
        }
    }

    /// Fetch the full event log of one match. A single failed attempt is final.
    pub async fn fetch_match(&self, match_id: &str) -> Result<EventTable, AnalysisError> {
        let url = self.events_url(match_id);
        tracing::info!("Fetching events for match {} from {}", match_id, url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            AnalysisError::DataUnavailable(format!("request for match {} failed: {}", match_id, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AnalysisError::DataUnavailable(format!(
                "event service returned {} for match {}",
                status, match_id
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AnalysisError::DataUnavailable(format!(
                "unreadable event data for match {}: {}",
                match_id, e
            ))
        })?;

        let table = parse_document(body).map_err(|e| match e {
            AnalysisError::MalformedInput(msg) => AnalysisError::DataUnavailable(msg),
            other => other,
        })?;

        if table.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!(
                "no events returned for match {}",
                match_id
            )));
        }

        tracing::info!(
            "Loaded {} events ({} columns) for match {}",
            table.len(),
            table.columns().len(),
            match_id
        );
        Ok(table)
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── File input ───────────────────────────────────────────────────────────────

pub async fn load_file(path: impl AsRef<Path>) -> Result<EventTable, AnalysisError> {
    let path = path.as_ref();
    tracing::info!("Reading events from {}", path.display());
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| {
            AnalysisError::MalformedInput(format!("cannot read {}: {}", path.display(), e))
        })?;
    parse_bytes(&bytes)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<EventTable, AnalysisError> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| AnalysisError::MalformedInput(e.to_string()))?;
    parse_document(document)
}

/// Turn a JSON document into an event table.
///
/// Accepted layouts:
/// - an array of records (flat, or nested StatsBomb events),
/// - a column-oriented object `{column: {row: value}}`,
/// - an index-oriented object `{row: {column: value}}`.
pub fn parse_document(document: Value) -> Result<EventTable, AnalysisError> {
    let records = match document {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(row, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(AnalysisError::MalformedInput(format!(
                    "record {} is not an object: {}",
                    row, other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(map) => table_object_to_records(map)?,
        other => {
            return Err(AnalysisError::MalformedInput(format!(
                "expected an array or object of event records, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut columns = BTreeSet::new();
    let mut events = Vec::with_capacity(records.len());

    for (row, record) in records.into_iter().enumerate() {
        let flat = flatten_record(record);
        columns.extend(flat.keys().cloned());
        let event: Event = serde_json::from_value(Value::Object(flat))
            .map_err(|e| AnalysisError::MalformedInput(format!("record {}: {}", row, e)))?;
        events.push(event);
    }

    Ok(EventTable::new(columns, events))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn table_object_to_records(
    map: Map<String, Value>,
) -> Result<Vec<Map<String, Value>>, AnalysisError> {
    let index_oriented = !map.is_empty() && map.keys().all(|k| k.parse::<usize>().is_ok());

    let mut rows: BTreeMap<usize, Map<String, Value>> = BTreeMap::new();
    for (outer, inner) in map {
        let inner = match inner {
            Value::Object(inner) => inner,
            other => {
                return Err(AnalysisError::MalformedInput(format!(
                    "entry '{}' is {}, expected an object",
                    outer,
                    json_kind(&other)
                )))
            }
        };

        if index_oriented {
            let row = outer.parse::<usize>().unwrap_or_default();
            rows.insert(row, inner);
            continue;
        }

        for (row_key, value) in inner {
            let row = row_key.parse::<usize>().map_err(|_| {
                AnalysisError::MalformedInput(format!(
                    "column '{}' has non-numeric row key '{}'",
                    outer, row_key
                ))
            })?;
            rows.entry(row).or_default().insert(outer.clone(), value);
        }
    }

    Ok(rows.into_values().collect())
}

/// Flatten nested event objects into dataframe-style columns: `{name: ..}` objects
/// collapse to their name and other objects expand to `parent_child` keys.
pub fn flatten_record(record: Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in record {
        flatten_into(&mut flat, key, value);
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, key: String, value: Value) {
    match value {
        Value::Object(mut inner) => {
            if let Some(name) = inner.remove("name") {
                flat.insert(key, name);
            } else {
                for (child, child_value) in inner {
                    flatten_into(flat, format!("{}_{}", key, child), child_value);
                }
            }
        }
        other => {
            flat.insert(key, other);
        }
    }
}

// ── Validation & export ──────────────────────────────────────────────────────

/// Check that every required column is present; the error lists missing names sorted.
pub fn validate(table: &EventTable, required: &[&str]) -> Result<(), AnalysisError> {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|col| !table.columns().contains(**col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    tracing::warn!("Event table is missing columns: {}", missing.join(", "));
    Err(AnalysisError::MissingColumns(missing))
}

/// Serialise the table as flat JSON records, keeping exactly the table's known columns,
/// untyped ones included, so the export reloads to the same table.
pub fn to_records_json(table: &EventTable) -> anyhow::Result<String> {
    let mut records = Vec::with_capacity(table.len());
    for event in table.events() {
        let Value::Object(fields) = serde_json::to_value(event)? else {
            anyhow::bail!("event did not serialise to an object");
        };
        let record: Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| table.columns().contains(key))
            .collect();
        records.push(Value::Object(record));
    }
    Ok(serde_json::to_string_pretty(&records)?)
}
