//! RCSB Protein Data Bank structure source.
//!
//! Searches for human X-ray structures of a protein, keeps the best one
//! (ligand-bound first, then best resolution), downloads its PDB file and
//! assembles the initial ligand set from the linked drugs plus `PubChem`
//! bioactives for the gene.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::adapters::http::{build_client, HttpFailure, RetryPolicy};
use crate::adapters::pubchem::PubChemClient;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    DrugCandidate, Ligand, RcsbConfig, RetryConfig, CID_PROVENANCE_PREFIX,
};
use crate::domain::ports::{CompoundRecord, StructureRecord, StructureSource};
use crate::services::artifacts::write_atomic;

const SEARCH_ROWS: u32 = 10;

/// Sorts after every real resolution.
const UNKNOWN_RESOLUTION: f64 = 999.0;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result_set: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    identifier: String,
}

/// Candidate structure with the metadata used for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub id: String,
    pub resolution: Option<f64>,
    pub has_ligand: bool,
}

impl EntryInfo {
    fn from_metadata(id: &str, metadata: &Value) -> Self {
        let info = &metadata["rcsb_entry_info"];
        let resolution = match &info["resolution_combined"] {
            Value::Array(values) => values.first().and_then(Value::as_f64),
            other => other.as_f64(),
        };
        let has_ligand = info["nonpolymer_entity_count"].as_u64().unwrap_or(0) > 0;
        Self {
            id: id.to_string(),
            resolution,
            has_ligand,
        }
    }
}

/// Ligand-bound entries first, then lowest resolution. Ties keep search order.
pub fn pick_best(entries: &[EntryInfo]) -> Option<&EntryInfo> {
    entries.iter().min_by(|a, b| {
        b.has_ligand.cmp(&a.has_ligand).then_with(|| {
            a.resolution
                .unwrap_or(UNKNOWN_RESOLUTION)
                .total_cmp(&b.resolution.unwrap_or(UNKNOWN_RESOLUTION))
        })
    })
}

/// Full-text search restricted to human X-ray structures under the
/// resolution limit, best resolution first.
fn search_query(protein: &str, max_resolution: f64) -> Value {
    json!({
        "query": {
            "type": "group",
            "logical_operator": "and",
            "nodes": [
                {
                    "type": "terminal",
                    "service": "full_text",
                    "parameters": {"value": protein}
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "rcsb_entity_source_organism.taxonomy_lineage.name",
                        "operator": "exact_match",
                        "value": "Homo sapiens"
                    }
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "exptl.method",
                        "operator": "exact_match",
                        "value": "X-RAY DIFFRACTION"
                    }
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "rcsb_entry_info.resolution_combined",
                        "operator": "less",
                        "value": max_resolution
                    }
                }
            ]
        },
        "return_type": "entry",
        "request_options": {
            "sort": [{"sort_by": "rcsb_entry_info.resolution_combined", "direction": "asc"}],
            "paginate": {"start": 0, "rows": SEARCH_ROWS}
        }
    })
}

fn provenance(record: &CompoundRecord) -> String {
    record.key.as_ref().map_or_else(
        || "pubchem_name_lookup".to_string(),
        |key| format!("{CID_PROVENANCE_PREFIX}{key}"),
    )
}

pub struct RcsbStructureSource {
    client: Client,
    config: RcsbConfig,
    structures_dir: PathBuf,
    pubchem: Arc<PubChemClient>,
    retry: RetryPolicy,
}

impl RcsbStructureSource {
    pub fn new(
        config: &RcsbConfig,
        structures_dir: impl Into<PathBuf>,
        pubchem: Arc<PubChemClient>,
        retry: &RetryConfig,
    ) -> DomainResult<Self> {
        Ok(Self {
            client: build_client(60)?,
            config: config.clone(),
            structures_dir: structures_dir.into(),
            pubchem,
            retry: RetryPolicy::from(retry),
        })
    }

    pub fn structures_dir(&self) -> &Path {
        &self.structures_dir
    }

    async fn search(&self, protein: &str) -> DomainResult<Vec<String>> {
        let body = search_query(protein, self.config.max_resolution);
        let (client, url, body) = (&self.client, &self.config.search_url, &body);
        let response: Option<SearchResponse> = self
            .retry
            .run("rcsb search", move || async move {
                let response = client.post(url).json(body).send().await?;
                let status = response.status();
                // An empty search answers 204 with no body.
                if status == StatusCode::NO_CONTENT {
                    return Ok(None);
                }
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(HttpFailure::from_status(status, &text));
                }
                Ok(Some(response.json().await?))
            })
            .await?;
        Ok(response
            .map(|r| r.result_set.into_iter().map(|h| h.identifier).collect())
            .unwrap_or_default())
    }

    async fn metadata(&self, id: &str) -> DomainResult<EntryInfo> {
        let url = format!("{}/{id}", self.config.data_url.trim_end_matches('/'));
        let (client, url) = (&self.client, url.as_str());
        let value: Value = self
            .retry
            .run("rcsb data", move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(HttpFailure::from_status(status, &text));
                }
                Ok(response.json().await?)
            })
            .await?;
        Ok(EntryInfo::from_metadata(id, &value))
    }

    /// Download `<id>.pdb`, reusing an earlier download.
    async fn download(&self, id: &str) -> DomainResult<PathBuf> {
        let path = self.structures_dir.join(format!("{id}.pdb"));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "structure already downloaded");
            return Ok(path);
        }
        let url = format!("{}/{id}.pdb", self.config.download_url.trim_end_matches('/'));
        let (client, url) = (&self.client, url.as_str());
        let bytes = self
            .retry
            .run("rcsb download", move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(HttpFailure::from_status(status, &text));
                }
                Ok(response.bytes().await?)
            })
            .await?;
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    async fn ligands_for(&self, protein: &str, drugs: &[DrugCandidate]) -> Vec<Ligand> {
        let mut ligands = Vec::new();
        for drug in drugs {
            match self.pubchem.lookup(&drug.drug).await {
                Ok(Some(record)) => ligands.push(
                    Ligand::new(record.name.clone(), record.structure.clone())
                        .with_mechanism(drug.mechanism.clone())
                        .with_approval_status(drug.fda_status.clone())
                        .with_provenance(provenance(&record)),
                ),
                Ok(None) => warn!(drug = %drug.drug, "no structure found for drug"),
                Err(e) => warn!(drug = %drug.drug, error = %e, "drug lookup failed"),
            }
        }

        let gene = protein.split_whitespace().next().unwrap_or(protein);
        match self.pubchem.target_compounds(protein).await {
            Ok(records) => ligands.extend(records.into_iter().map(|record| {
                let provenance = provenance(&record);
                Ligand::new(record.name, record.structure)
                    .with_mechanism(format!("Bioactive against {gene} (PubChem assay)"))
                    .with_approval_status("Investigational")
                    .with_provenance(provenance)
            })),
            Err(e) => warn!(gene, error = %e, "bioactive compound search failed"),
        }
        ligands
    }
}

#[async_trait]
impl StructureSource for RcsbStructureSource {
    #[instrument(skip(self, drugs), fields(drugs = drugs.len()))]
    async fn retrieve(
        &self,
        protein: &str,
        drugs: &[DrugCandidate],
    ) -> DomainResult<StructureRecord> {
        let ids = self.search(protein).await?;
        if ids.is_empty() {
            warn!("no structures found");
            return Ok(StructureRecord::default());
        }

        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.metadata(id).await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(id = %id, error = %e, "entry metadata unavailable"),
            }
        }
        let Some(best) = pick_best(&entries) else {
            return Ok(StructureRecord::default());
        };
        info!(
            structure = %best.id,
            resolution = ?best.resolution,
            has_ligand = best.has_ligand,
            "structure selected"
        );

        let file = self.download(&best.id).await?;
        let ligands = self.ligands_for(protein, drugs).await;
        Ok(StructureRecord {
            structure_id: Some(best.id.clone()),
            structure_file: Some(file),
            ligands,
        })
    }
}
