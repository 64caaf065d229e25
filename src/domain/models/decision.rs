//! Expansion decisions and the normalization of raw reasoner payloads.
//!
//! The reasoner answers in free-form JSON. Everything past [`ExpansionDecision::from_payload`]
//! only ever sees the closed set of [`ExpansionAction`]s.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run_state::ExpansionRecord;

/// Provenance prefix for compounds identified by a database id.
pub const CID_PROVENANCE_PREFIX: &str = "pubchem_cid_";

/// What to do after a docking round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionAction {
    ExpandBySimilarity,
    ExpandByClass,
    Proceed,
}

impl ExpansionAction {
    /// Parse a reasoner action string, accepting the historical aliases.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "expand_by_similarity" | "expand_3d_similar" | "expand_similar" => {
                Some(Self::ExpandBySimilarity)
            }
            "expand_by_class" | "expand_class" => Some(Self::ExpandByClass),
            "proceed" => Some(Self::Proceed),
            _ => None,
        }
    }

    pub const fn is_expansion(self) -> bool {
        !matches!(self, Self::Proceed)
    }
}

impl fmt::Display for ExpansionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExpandBySimilarity => "expand_by_similarity",
            Self::ExpandByClass => "expand_by_class",
            Self::Proceed => "proceed",
        };
        f.write_str(s)
    }
}

/// Action-specific seed data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionSeed {
    #[default]
    None,
    /// Compound keys to search around. Empty means "use the best results so far".
    Similarity { keys: Vec<String> },
    /// Either an explicit name list or a class to enumerate.
    Class {
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        names: Vec<String>,
    },
}

/// A normalized reasoning outcome for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionDecision {
    pub round: u32,
    pub action: ExpansionAction,
    pub rationale: String,
    pub hypothesis: String,
    pub seed: ExpansionSeed,
    /// Restrict fan-out to these targets. `None` means every tracked target.
    pub target_scope: Option<Vec<String>>,
}

impl ExpansionDecision {
    pub fn proceed(round: u32, rationale: impl Into<String>) -> Self {
        Self {
            round,
            action: ExpansionAction::Proceed,
            rationale: rationale.into(),
            hypothesis: String::new(),
            seed: ExpansionSeed::None,
            target_scope: None,
        }
    }

    /// Normalize a raw reasoner payload.
    ///
    /// Missing, non-string or unrecognized actions become `proceed`. Seed data
    /// is read from `seed_keys`/`seed_cids` (numbers or strings) for similarity
    /// and `drug_class`/`class_name` plus `drug_names` for class expansion.
    pub fn from_payload(round: u32, payload: &Value) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .and_then(ExpansionAction::parse_lenient)
            .unwrap_or(ExpansionAction::Proceed);

        let rationale = string_field(payload, &["rationale", "reasoning"]).unwrap_or_default();
        let hypothesis = string_field(payload, &["hypothesis"]).unwrap_or_default();

        let seed = match action {
            ExpansionAction::ExpandBySimilarity => ExpansionSeed::Similarity {
                keys: seed_keys(payload),
            },
            ExpansionAction::ExpandByClass => ExpansionSeed::Class {
                class_name: string_field(payload, &["drug_class", "class_name"])
                    .filter(|s| !s.is_empty()),
                names: string_list(payload.get("drug_names")),
            },
            ExpansionAction::Proceed => ExpansionSeed::None,
        };

        let target_scope = payload
            .get("targets")
            .map(|v| string_list(Some(v)))
            .filter(|t| !t.is_empty());

        Self {
            round,
            action,
            rationale,
            hypothesis,
            seed,
            target_scope,
        }
    }

    /// Force `proceed`, annotating the rationale when an expansion was overridden.
    pub fn cap(mut self, max_rounds: u32) -> Self {
        if self.action.is_expansion() {
            self.rationale = format!(
                "{} (Round cap of {max_rounds} expansion rounds reached; proceeding to synthesis instead of {}.)",
                self.rationale.trim_end(),
                self.action
            )
            .trim_start()
            .to_string();
        }
        self.action = ExpansionAction::Proceed;
        self.seed = ExpansionSeed::None;
        self.target_scope = None;
        self
    }

    pub fn to_record(&self) -> ExpansionRecord {
        ExpansionRecord {
            round: self.round,
            action: self.action,
            rationale: self.rationale.clone(),
            seed: self.seed.clone(),
            target_scope: self.target_scope.clone(),
        }
    }

    /// Rebuild a decision from its logged form (used on resume).
    pub fn from_record(record: &ExpansionRecord, hypothesis: impl Into<String>) -> Self {
        Self {
            round: record.round,
            action: record.action,
            rationale: record.rationale.clone(),
            hypothesis: hypothesis.into(),
            seed: record.seed.clone(),
            target_scope: record.target_scope.clone(),
        }
    }
}

/// Extract the compound key from a `pubchem_cid_<n>` provenance tag.
pub fn seed_key_from_provenance(provenance: &str) -> Option<String> {
    provenance
        .strip_prefix(CID_PROVENANCE_PREFIX)
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn seed_keys(payload: &Value) -> Vec<String> {
    let raw = ["seed_keys", "seed_cids"]
        .iter()
        .map(|k| string_list(payload.get(*k)))
        .find(|list| !list.is_empty())
        .unwrap_or_default();

    let mut keys: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let key = seed_key_from_provenance(&item).unwrap_or(item);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_action_defaults_to_proceed() {
        let decision = ExpansionDecision::from_payload(1, &json!({"rationale": "weak hits"}));
        assert_eq!(decision.action, ExpansionAction::Proceed);
        assert_eq!(decision.rationale, "weak hits");
    }

    #[test]
    fn test_unknown_and_non_string_actions_default_to_proceed() {
        let unknown = ExpansionDecision::from_payload(1, &json!({"action": "dock_everything"}));
        assert_eq!(unknown.action, ExpansionAction::Proceed);

        let numeric = ExpansionDecision::from_payload(1, &json!({"action": 7}));
        assert_eq!(numeric.action, ExpansionAction::Proceed);
    }

    #[test]
    fn test_similarity_seeds_accept_numbers_and_tags() {
        let decision = ExpansionDecision::from_payload(
            2,
            &json!({
                "action": "expand_3d_similar",
                "seed_cids": [2244, "pubchem_cid_3672", "2244"],
            }),
        );
        assert_eq!(decision.action, ExpansionAction::ExpandBySimilarity);
        assert_eq!(
            decision.seed,
            ExpansionSeed::Similarity {
                keys: vec!["2244".into(), "3672".into()]
            }
        );
    }

    #[test]
    fn test_class_seed() {
        let decision = ExpansionDecision::from_payload(
            1,
            &json!({
                "action": "expand_class",
                "drug_class": "statins",
                "drug_names": ["atorvastatin", "", "simvastatin"],
                "targets": ["HMGCR"],
            }),
        );
        assert_eq!(
            decision.seed,
            ExpansionSeed::Class {
                class_name: Some("statins".into()),
                names: vec!["atorvastatin".into(), "simvastatin".into()],
            }
        );
        assert_eq!(decision.target_scope, Some(vec!["HMGCR".to_string()]));
    }

    #[test]
    fn test_cap_annotates_only_overrides() {
        let expand = ExpansionDecision::from_payload(
            3,
            &json!({"action": "expand_by_class", "rationale": "try kinase inhibitors"}),
        )
        .cap(2);
        assert_eq!(expand.action, ExpansionAction::Proceed);
        assert!(expand.rationale.starts_with("try kinase inhibitors"));
        assert!(expand.rationale.contains("Round cap"));
        assert_eq!(expand.seed, ExpansionSeed::None);

        let proceed = ExpansionDecision::proceed(3, "done").cap(2);
        assert_eq!(proceed.rationale, "done");
    }

    #[test]
    fn test_record_roundtrip_keeps_seed() {
        let decision = ExpansionDecision::from_payload(
            1,
            &json!({"action": "expand_by_similarity", "seed_keys": ["5090"], "hypothesis": "h"}),
        );
        let record = decision.to_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: ExpansionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(ExpansionDecision::from_record(&back, "h"), decision);
    }

    #[test]
    fn test_seed_key_from_provenance() {
        assert_eq!(seed_key_from_provenance("pubchem_cid_42"), Some("42".into()));
        assert_eq!(seed_key_from_provenance("similarity_cid_1_from_2"), None);
        assert_eq!(seed_key_from_provenance("pubchem_cid_"), None);
    }
}
