//! Ingestor: joins five per-tier CSV tables into a stream of
//! `IntegrationSnapshot`s (spec.md §4.1).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Connection, IntegrationSnapshot, NamedResource, RowSpan, Tier};

/// Default bounded-channel capacity a caller should use between the
/// ingestor and its downstream workers.
pub const DEFAULT_MPSC_CHANNEL_CAPACITY: usize = 256;

const INTEGRATIONS_HEADER: &[&str] = &[
    "_ID",
    "EMAIL",
    "_USERID",
    "VERSION",
    "NUMSTORES",
    "LICENSEEDITION",
    "UPDATEINPROGRESS",
    "SETTINGS",
];

#[derive(Debug, Deserialize)]
struct IntegrationRow {
    #[serde(rename = "_ID")]
    id: String,
    #[serde(rename = "EMAIL")]
    email: String,
    #[serde(rename = "_USERID")]
    user_id: String,
    #[serde(rename = "VERSION")]
    version: String,
    #[serde(rename = "NUMSTORES")]
    num_stores: u32,
    #[serde(rename = "LICENSEEDITION")]
    license_edition: String,
    #[serde(rename = "UPDATEINPROGRESS")]
    update_in_progress: bool,
    #[serde(rename = "SETTINGS")]
    settings: String,
}

#[derive(Debug, Deserialize, Clone)]
struct ChildRow {
    #[serde(rename = "INTEGRATIONID")]
    integration_id: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "NAME")]
    name: String,
}

#[derive(Debug, Deserialize, Clone)]
struct ConnectionRow {
    #[serde(rename = "INTEGRATIONID")]
    integration_id: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "NAME")]
    name: String,
    #[serde(rename = "OFFLINE", default)]
    offline: bool,
}

/// Remove doubled double-quotes from an embedded-JSON CSV cell, tolerating
/// sources that pre-escape quotes before the `csv` crate's own RFC 4180
/// unescaping runs.
#[must_use]
pub fn unescape_csv_embedded_json(raw: &str) -> String {
    raw.replace("\"\"", "\"")
}

/// Parse the `SETTINGS` cell as JSON, retrying with
/// `unescape_csv_embedded_json` if the first attempt fails.
fn parse_settings(raw: &str) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(raw).or_else(|_| serde_json::from_str(&unescape_csv_embedded_json(raw)))
}

/// A best-effort-degraded row: malformed `SETTINGS` JSON still produces a
/// snapshot, with an attached warning message instead of aborting.
pub struct IngestWarning {
    pub integration_id: String,
    pub message: String,
}

/// Outcome of ingesting one tier's five tables.
pub struct IngestOutcome {
    pub snapshots: Vec<IntegrationSnapshot>,
    pub warnings: Vec<IngestWarning>,
}

fn validate_header(reader: &mut csv::Reader<std::fs::File>, file: &str) -> Result<()> {
    let headers = reader.headers().map_err(|source| Error::Csv {
        file: file.to_string(),
        source,
    })?;
    let found: Vec<String> = headers.iter().map(str::to_string).collect();
    if found != INTEGRATIONS_HEADER {
        return Err(Error::HeaderMismatch {
            file: file.to_string(),
            expected: INTEGRATIONS_HEADER.iter().map(|s| (*s).to_string()).collect(),
            found,
        });
    }
    Ok(())
}

fn load_child_table<T, F>(path: &Path, mut key_fn: F) -> Result<HashMap<String, Vec<T>>>
where
    T: for<'de> Deserialize<'de>,
    F: FnMut(&T) -> String,
{
    let mut map: HashMap<String, Vec<T>> = HashMap::new();
    if !path.exists() {
        return Ok(map);
    }
    let file_name = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| Error::Csv {
            file: file_name.clone(),
            source,
        })?;
    for record in reader.deserialize::<T>() {
        let row = record.map_err(|source| Error::Csv {
            file: file_name.clone(),
            source,
        })?;
        let key = key_fn(&row);
        map.entry(key).or_default().push(row);
    }
    Ok(map)
}

/// Stream `integrations.csv` for `tier`, joining the four child tables
/// located alongside it in `dir`, invoking `on_snapshot` once per row so
/// memory use stays bounded regardless of file size.
pub fn ingest_tier(
    dir: &Path,
    tier: Tier,
    mut on_snapshot: impl FnMut(IntegrationSnapshot),
    mut on_warning: impl FnMut(IngestWarning),
) -> Result<()> {
    let imports = load_child_table::<ChildRow, _>(&dir.join("imports.csv"), |r| {
        r.integration_id.clone()
    })?;
    let exports = load_child_table::<ChildRow, _>(&dir.join("exports.csv"), |r| {
        r.integration_id.clone()
    })?;
    let flows =
        load_child_table::<ChildRow, _>(&dir.join("flows.csv"), |r| r.integration_id.clone())?;
    let connections = load_child_table::<ConnectionRow, _>(&dir.join("connections.csv"), |r| {
        r.integration_id.clone()
    })?;

    let integrations_path = dir.join("integrations.csv");
    let file_name = integrations_path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&integrations_path)
        .map_err(|source| Error::Csv {
            file: file_name.clone(),
            source,
        })?;
    validate_header(&mut reader, &file_name)?;

    for (idx, record) in reader.deserialize::<IntegrationRow>().enumerate() {
        let line = idx as u64 + 2; // +1 for 1-based, +1 for header row.
        let row = record.map_err(|source| Error::Csv {
            file: file_name.clone(),
            source,
        })?;

        let (settings, warning) = match parse_settings(&row.settings) {
            Ok(value) => (value, None),
            Err(err) => (
                Value::Object(serde_json::Map::new()),
                Some(IngestWarning {
                    integration_id: row.id.clone(),
                    message: format!("ingest-warning: malformed SETTINGS json: {err}"),
                }),
            ),
        };

        if let Some(w) = warning {
            on_warning(w);
        }

        let to_named = |rows: &[ChildRow]| {
            rows.iter()
                .map(|r| NamedResource {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    extra: HashMap::new(),
                })
                .collect::<Vec<_>>()
        };

        let snapshot = IntegrationSnapshot {
            id: row.id.clone(),
            email: row.email,
            user_id: row.user_id,
            version: row.version,
            store_count: row.num_stores,
            license_edition: row.license_edition,
            update_in_progress: row.update_in_progress,
            settings,
            imports: imports.get(&row.id).map(|v| to_named(v)).unwrap_or_default(),
            exports: exports.get(&row.id).map(|v| to_named(v)).unwrap_or_default(),
            flows: flows.get(&row.id).map(|v| to_named(v)).unwrap_or_default(),
            connections: connections
                .get(&row.id)
                .map(|rows| {
                    rows.iter()
                        .map(|r| Connection {
                            id: r.id.clone(),
                            name: r.name.clone(),
                            offline: r.offline,
                            extra: HashMap::new(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            source_row: Some(RowSpan {
                tier,
                integration_line: line,
            }),
        };

        on_snapshot(snapshot);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn unescape_handles_doubled_quotes() {
        let raw = r#"{""connectorEdition"":""starter""}"#;
        let unescaped = unescape_csv_embedded_json(raw);
        assert!(serde_json::from_str::<Value>(&unescaped).is_ok());
    }

    #[test]
    fn ingest_tier_joins_children_and_streams_snapshots() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "integrations.csv",
            "_ID,EMAIL,_USERID,VERSION,NUMSTORES,LICENSEEDITION,UPDATEINPROGRESS,SETTINGS\n\
             test-001,a@b.com,u1,1.0,1,starter,false,\"{\"\"connectorEdition\"\":\"\"starter\"\"}\"\n",
        );
        write_file(
            dir.path(),
            "imports.csv",
            "INTEGRATIONID,ID,NAME\ntest-001,i1,My Import\n",
        );
        write_file(dir.path(), "exports.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "flows.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(
            dir.path(),
            "connections.csv",
            "INTEGRATIONID,ID,NAME,OFFLINE\ntest-001,c1,conn,true\n",
        );

        let mut snapshots = Vec::new();
        let mut warnings = Vec::new();
        ingest_tier(
            dir.path(),
            Tier::Tier1,
            |s| snapshots.push(s),
            |w| warnings.push(w),
        )
        .unwrap();

        assert_eq!(snapshots.len(), 1);
        assert!(warnings.is_empty());
        let snap = &snapshots[0];
        assert_eq!(snap.imports.len(), 1);
        assert!(snap.exports.is_empty());
        assert_eq!(snap.connections.len(), 1);
        assert!(snap.connections[0].offline);
        assert_eq!(snap.connector_edition(), Some("starter"));
    }

    #[test]
    fn header_mismatch_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "integrations.csv", "WRONG,HEADER\nx,y\n");
        write_file(dir.path(), "imports.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "exports.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "flows.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "connections.csv", "INTEGRATIONID,ID,NAME,OFFLINE\n");

        let result = ingest_tier(dir.path(), Tier::Tier1, |_| {}, |_| {});
        assert!(matches!(result, Err(Error::HeaderMismatch { .. })));
    }

    #[test]
    fn malformed_settings_json_degrades_to_warning_not_abort() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "integrations.csv",
            "_ID,EMAIL,_USERID,VERSION,NUMSTORES,LICENSEEDITION,UPDATEINPROGRESS,SETTINGS\n\
             test-002,a@b.com,u1,1.0,1,starter,false,not-json\n",
        );
        write_file(dir.path(), "imports.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "exports.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "flows.csv", "INTEGRATIONID,ID,NAME\n");
        write_file(dir.path(), "connections.csv", "INTEGRATIONID,ID,NAME,OFFLINE\n");

        let mut snapshots = Vec::new();
        let mut warnings = Vec::new();
        ingest_tier(
            dir.path(),
            Tier::Tier1,
            |s| snapshots.push(s),
            |w| warnings.push(w),
        )
        .unwrap();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(warnings.len(), 1);
    }
}
