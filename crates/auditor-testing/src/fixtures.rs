//! CSV fixture builders matching the exact headers `auditor_core::ingestor`
//! expects, plus a helper that materializes a full five-table tier
//! directory on disk for ingestor/orchestrator integration tests.

use std::path::Path;

use serde_json::Value;

/// One row of `integrations.csv`.
#[derive(Debug, Clone)]
pub struct IntegrationFixture {
    pub id: String,
    pub email: String,
    pub user_id: String,
    pub version: String,
    pub num_stores: u32,
    pub license_edition: String,
    pub update_in_progress: bool,
    pub settings: Value,
}

impl IntegrationFixture {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: "integration@example.com".to_string(),
            user_id: "user-1".to_string(),
            version: "1.0".to_string(),
            num_stores: 1,
            license_edition: "starter".to_string(),
            update_in_progress: false,
            settings: serde_json::json!({ "connectorEdition": "starter" }),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_edition(mut self, edition: impl Into<String>) -> Self {
        self.license_edition = edition.into();
        self
    }

    #[must_use]
    pub fn with_update_in_progress(mut self, update_in_progress: bool) -> Self {
        self.update_in_progress = update_in_progress;
        self
    }

    #[must_use]
    pub fn with_store_count(mut self, num_stores: u32) -> Self {
        self.num_stores = num_stores;
        self
    }

    fn csv_row(&self) -> String {
        // SETTINGS is embedded JSON; doubled-quote-escape it per RFC 4180
        // so it round-trips through the `csv` crate's own unescaping.
        let settings_json = self.settings.to_string().replace('"', "\"\"");
        format!(
            "{},{},{},{},{},{},{},\"{}\"\n",
            self.id,
            self.email,
            self.user_id,
            self.version,
            self.num_stores,
            self.license_edition,
            self.update_in_progress,
            settings_json
        )
    }
}

/// One row of `imports.csv` / `exports.csv` / `flows.csv`.
#[derive(Debug, Clone)]
pub struct ChildFixture {
    pub integration_id: String,
    pub id: String,
    pub name: String,
}

impl ChildFixture {
    #[must_use]
    pub fn new(integration_id: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            integration_id: integration_id.into(),
            id: id.into(),
            name: name.into(),
        }
    }

    fn csv_row(&self) -> String {
        format!("{},{},{}\n", self.integration_id, self.id, self.name)
    }
}

/// One row of `connections.csv`.
#[derive(Debug, Clone)]
pub struct ConnectionFixture {
    pub integration_id: String,
    pub id: String,
    pub name: String,
    pub offline: bool,
}

impl ConnectionFixture {
    #[must_use]
    pub fn new(integration_id: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            integration_id: integration_id.into(),
            id: id.into(),
            name: name.into(),
            offline: false,
        }
    }

    #[must_use]
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{}\n",
            self.integration_id, self.id, self.name, self.offline
        )
    }
}

/// A full tier directory's worth of fixture rows, ready to be written to
/// disk for an `auditor_core::ingestor::ingest_tier` call.
#[derive(Debug, Clone, Default)]
pub struct TierFixture {
    pub integrations: Vec<IntegrationFixture>,
    pub imports: Vec<ChildFixture>,
    pub exports: Vec<ChildFixture>,
    pub flows: Vec<ChildFixture>,
    pub connections: Vec<ConnectionFixture>,
}

impl TierFixture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_integration(mut self, integration: IntegrationFixture) -> Self {
        self.integrations.push(integration);
        self
    }

    #[must_use]
    pub fn with_import(mut self, import: ChildFixture) -> Self {
        self.imports.push(import);
        self
    }

    #[must_use]
    pub fn with_export(mut self, export: ChildFixture) -> Self {
        self.exports.push(export);
        self
    }

    #[must_use]
    pub fn with_flow(mut self, flow: ChildFixture) -> Self {
        self.flows.push(flow);
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionFixture) -> Self {
        self.connections.push(connection);
        self
    }

    /// Write `integrations.csv`, `imports.csv`, `exports.csv`, `flows.csv`
    /// and `connections.csv` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut integrations_csv =
            "_ID,EMAIL,_USERID,VERSION,NUMSTORES,LICENSEEDITION,UPDATEINPROGRESS,SETTINGS\n"
                .to_string();
        for row in &self.integrations {
            integrations_csv.push_str(&row.csv_row());
        }
        std::fs::write(dir.join("integrations.csv"), integrations_csv)?;

        write_child_table(dir, "imports.csv", &self.imports)?;
        write_child_table(dir, "exports.csv", &self.exports)?;
        write_child_table(dir, "flows.csv", &self.flows)?;

        let mut connections_csv = "INTEGRATIONID,ID,NAME,OFFLINE\n".to_string();
        for row in &self.connections {
            connections_csv.push_str(&row.csv_row());
        }
        std::fs::write(dir.join("connections.csv"), connections_csv)?;

        Ok(())
    }
}

fn write_child_table(dir: &Path, file_name: &str, rows: &[ChildFixture]) -> std::io::Result<()> {
    let mut csv = "INTEGRATIONID,ID,NAME\n".to_string();
    for row in rows {
        csv.push_str(&row.csv_row());
    }
    std::fs::write(dir.join(file_name), csv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::ingestor::ingest_tier;
    use auditor_core::model::Tier;
    use tempfile::TempDir;

    #[test]
    fn tier_fixture_round_trips_through_the_real_ingestor() {
        let dir = TempDir::new().unwrap();
        let tier = TierFixture::new()
            .with_integration(
                IntegrationFixture::new("test-001")
                    .with_update_in_progress(true)
                    .with_settings(serde_json::json!({"connectorEdition": "premium"})),
            )
            .with_import(ChildFixture::new("test-001", "i1", "My Import"))
            .with_connection(ConnectionFixture::new("test-001", "c1", "conn").offline());

        tier.write_to(dir.path()).unwrap();

        let mut snapshots = Vec::new();
        ingest_tier(dir.path(), Tier::Tier1, |s| snapshots.push(s), |_| {}).unwrap();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].imports.len(), 1);
        assert!(snapshots[0].connections[0].offline);
        assert_eq!(snapshots[0].connector_edition(), Some("premium"));
    }

    #[test]
    fn empty_tier_writes_header_only_files() {
        let dir = TempDir::new().unwrap();
        TierFixture::new().write_to(dir.path()).unwrap();

        let mut snapshots = Vec::new();
        ingest_tier(dir.path(), Tier::Tier1, |s| snapshots.push(s), |_| {}).unwrap();
        assert!(snapshots.is_empty());
    }
}
