//! Business-rules and remediation-logic configuration, loaded once per
//! session from JSON and parsed into tagged variants (spec.md §9 "Dynamic
//! JSON rules") rather than walked as loose `serde_json::Value` on the hot
//! path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-edition resource-count expectations, expressed per store.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionRequirements {
    #[serde(default)]
    pub imports_per_store: u32,
    #[serde(default)]
    pub exports_per_store: u32,
    #[serde(default)]
    pub flows_per_store: u32,
}

/// License-edition validation parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseValidation {
    pub valid_editions: Vec<String>,
    pub max_settings_size: u64,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

/// `requiredProperties` — top-level, `settings`-level and per-section keys
/// that must be present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredProperties {
    #[serde(default)]
    pub top_level: Vec<String>,
    #[serde(default)]
    pub settings_level: Vec<String>,
    #[serde(default)]
    pub section_properties: Vec<String>,
}

/// Tolerances applied when comparing observed vs. expected resource counts.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tolerances {
    #[serde(default)]
    pub resource_count_tolerance: i64,
}

/// Names of resources an edition requires to exist by external identifier.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredResources {
    #[serde(default)]
    pub required_imports: Vec<String>,
    #[serde(default)]
    pub required_exports: Vec<String>,
    #[serde(default)]
    pub required_flows: Vec<String>,
}

/// The full business-rules document for one `(product, version)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRules {
    pub edition_requirements: HashMap<String, EditionRequirements>,
    pub license_validation: LicenseValidation,
    #[serde(default)]
    pub required_properties: RequiredProperties,
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default)]
    pub required_resources: HashMap<String, RequiredResources>,
}

impl BusinessRules {
    /// Parse and validate a business-rules document, failing with
    /// `Error::Config` if a required top-level key is absent.
    pub fn parse(raw: &str) -> Result<Self> {
        let rules: Self = serde_json::from_str(raw)?;
        if rules.edition_requirements.is_empty() {
            return Err(Error::Config(
                "business rules missing editionRequirements".into(),
            ));
        }
        if rules.license_validation.valid_editions.is_empty() {
            return Err(Error::Config(
                "business rules missing licenseValidation.validEditions".into(),
            ));
        }
        Ok(rules)
    }

    /// Merge `overlay` (a per-product/version override) over `self`,
    /// field-level: a present key in the overlay wins.
    #[must_use]
    pub fn merged_with(mut self, overlay: BusinessRulesOverlay) -> Self {
        for (edition, reqs) in overlay.edition_requirements {
            self.edition_requirements.insert(edition, reqs);
        }
        if let Some(lv) = overlay.license_validation {
            self.license_validation = lv;
        }
        if let Some(rp) = overlay.required_properties {
            self.required_properties = rp;
        }
        if let Some(t) = overlay.tolerances {
            self.tolerances = t;
        }
        for (edition, reqs) in overlay.required_resources {
            self.required_resources.insert(edition, reqs);
        }
        self
    }
}

/// A partial business-rules document used for per-product overrides; every
/// field is optional so only the keys present in the override file take
/// effect.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRulesOverlay {
    #[serde(default)]
    pub edition_requirements: HashMap<String, EditionRequirements>,
    #[serde(default)]
    pub license_validation: Option<LicenseValidation>,
    #[serde(default)]
    pub required_properties: Option<RequiredProperties>,
    #[serde(default)]
    pub tolerances: Option<Tolerances>,
    #[serde(default)]
    pub required_resources: HashMap<String, RequiredResources>,
}

impl BusinessRulesOverlay {
    /// Parse an overlay document from JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A pre-compiled segment of a templated string: either literal text or a
/// JSON-pointer-style path to resolve against `{snapshot, event.evidence,
/// ctx}` at action-generation time (spec.md §9 "Template substitution").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    /// e.g. `evidence.missing[0]` or `ctx.edition`.
    Path(String),
}

/// Compile a `{{...}}`-templated string into literal/path segments once,
/// at load time.
#[must_use]
pub fn compile_template(template: &str) -> Vec<TemplateSegment> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(TemplateSegment::Literal(rest[..start].to_string()));
        }
        rest = &rest[start + 2..];
        if let Some(end) = rest.find("}}") {
            let path = rest[..end].trim().to_string();
            segments.push(TemplateSegment::Path(path));
            rest = &rest[end + 2..];
        } else {
            // Unterminated token: treat the rest as literal.
            segments.push(TemplateSegment::Literal(format!("{{{{{rest}")));
            rest = "";
            break;
        }
    }
    if !rest.is_empty() {
        segments.push(TemplateSegment::Literal(rest.to_string()));
    }
    segments
}

/// One remediation action template as declared in `remediation-logic.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    pub id: String,
    pub action_type: crate::model::ActionType,
    pub target_type: String,
    pub resource_type: String,
    #[serde(default)]
    pub resource_id_template: Option<String>,
    pub payload_template: HashMap<String, String>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub rollbackable: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// JSON-pointer-style path into `event.evidence` naming an array to
    /// repeat this template once per element of (spec.md §4.3
    /// `repeatFor`).
    #[serde(default)]
    pub repeat_for: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// `remediationLogic[corruptionType]` → ordered list of templates. The
/// document on disk is the map itself, keyed by corruption type, with no
/// wrapping key.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RemediationLogic {
    pub rules: HashMap<String, Vec<ActionTemplate>>,
}

impl RemediationLogic {
    /// Parse the remediation-logic document from JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Templates declared for a given corruption type, if any.
    #[must_use]
    pub fn templates_for(&self, corruption_type: &str) -> Option<&[ActionTemplate]> {
        self.rules.get(corruption_type).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_template_splits_literal_and_path_segments() {
        let segments = compile_template("patch {{evidence.missing[0]}} for {{ctx.edition}}!");
        assert_eq!(
            segments,
            vec![
                TemplateSegment::Literal("patch ".to_string()),
                TemplateSegment::Path("evidence.missing[0]".to_string()),
                TemplateSegment::Literal(" for ".to_string()),
                TemplateSegment::Path("ctx.edition".to_string()),
                TemplateSegment::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn compile_template_with_no_tokens_is_single_literal() {
        let segments = compile_template("no tokens here");
        assert_eq!(
            segments,
            vec![TemplateSegment::Literal("no tokens here".to_string())]
        );
    }

    #[test]
    fn business_rules_parse_rejects_missing_edition_requirements() {
        let raw = r#"{"editionRequirements":{},"licenseValidation":{"validEditions":["starter"],"maxSettingsSize":1000}}"#;
        assert!(BusinessRules::parse(raw).is_err());
    }

    #[test]
    fn overlay_overrides_only_present_fields() {
        let base = BusinessRules::parse(
            r#"{
                "editionRequirements": {"starter": {"importsPerStore": 1, "exportsPerStore": 1, "flowsPerStore": 1}},
                "licenseValidation": {"validEditions": ["starter"], "maxSettingsSize": 1000}
            }"#,
        )
        .unwrap();
        let overlay = BusinessRulesOverlay::parse(
            r#"{"editionRequirements": {"starter": {"importsPerStore": 5, "exportsPerStore": 1, "flowsPerStore": 1}}}"#,
        )
        .unwrap();
        let merged = base.merged_with(overlay);
        assert_eq!(
            merged.edition_requirements["starter"].imports_per_store,
            5
        );
    }
}
