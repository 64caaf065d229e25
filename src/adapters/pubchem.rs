//! `PubChem` PUG REST client: name lookup, 3-D similarity and bioactive
//! compounds for a gene target. All requests share one rate limiter.

use governor::DefaultDirectRateLimiter;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::adapters::http::{build_client, rate_limiter, HttpFailure, RetryPolicy};
use crate::domain::errors::DomainResult;
use crate::domain::models::{PubChemConfig, RetryConfig};
use crate::domain::ports::CompoundRecord;

const PROPERTIES: &str = "CanonicalSMILES,IUPACName,MolecularFormula";

/// Maximum CIDs per property request.
const PROPERTY_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct PropertyEnvelope {
    #[serde(rename = "PropertyTable")]
    table: PropertyTable,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperties>,
}

/// The service has renamed the SMILES column over time; accept every variant.
#[derive(Debug, Deserialize)]
struct CompoundProperties {
    #[serde(rename = "CID")]
    cid: u64,
    #[serde(rename = "CanonicalSMILES", default)]
    canonical_smiles: Option<String>,
    #[serde(rename = "ConnectivitySMILES", default)]
    connectivity_smiles: Option<String>,
    #[serde(rename = "SMILES", default)]
    smiles: Option<String>,
    #[serde(rename = "IUPACName", default)]
    iupac_name: Option<String>,
}

impl CompoundProperties {
    fn structure(&self) -> String {
        [&self.canonical_smiles, &self.connectivity_smiles, &self.smiles]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    fn into_record(self, name: Option<&str>) -> CompoundRecord {
        let structure = self.structure();
        let name = name.map_or_else(
            || {
                self.iupac_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("CID_{}", self.cid))
            },
            str::to_string,
        );
        CompoundRecord {
            name,
            structure,
            key: Some(self.cid.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentifierEnvelope {
    #[serde(rename = "IdentifierList")]
    list: IdentifierList,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct InformationEnvelope {
    #[serde(rename = "InformationList")]
    list: InformationList,
}

#[derive(Debug, Deserialize)]
struct InformationList {
    #[serde(rename = "Information", default)]
    information: Vec<Information>,
}

#[derive(Debug, Deserialize)]
struct Information {
    #[serde(rename = "CID", default)]
    cids: Vec<u64>,
}

/// Percent-encode one URL path segment.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Name variants worth trying: the name itself, then each parenthetical part.
fn name_variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.trim().to_string()];
    for part in name.split(['(', ')']).map(str::trim) {
        if !part.is_empty() && !variants.iter().any(|v| v == part) {
            variants.push(part.to_string());
        }
    }
    variants
}

pub struct PubChemClient {
    client: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
    max_target_compounds: usize,
}

impl PubChemClient {
    pub fn new(config: &PubChemConfig, retry: &RetryConfig) -> DomainResult<Self> {
        Ok(Self {
            client: build_client(30)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: rate_limiter(config.requests_per_second),
            retry: RetryPolicy::from(retry),
            max_target_compounds: config.max_target_compounds,
        })
    }

    /// GET a JSON document. `None` on 404.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> DomainResult<Option<T>> {
        let (client, limiter) = (&self.client, &self.limiter);
        self.retry
            .run("pubchem", move || async move {
                limiter.until_ready().await;
                let response = client.get(url).send().await?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(HttpFailure::from_status(status, &text));
                }
                Ok(Some(response.json::<T>().await?))
            })
            .await
    }

    async fn lookup_single(&self, name: &str) -> DomainResult<Option<CompoundRecord>> {
        let url = format!(
            "{}/compound/name/{}/property/{PROPERTIES}/JSON",
            self.base_url,
            encode_segment(name)
        );
        let envelope: Option<PropertyEnvelope> = self.get_json(&url).await?;
        Ok(envelope
            .and_then(|e| e.table.properties.into_iter().next())
            .map(|p| p.into_record(Some(name)))
            .filter(|r| !r.structure.is_empty()))
    }

    /// Resolve a drug name, retrying parenthetical aliases
    /// (`"daraxonrasib (RMC-6236)"` tries both parts).
    #[instrument(skip(self))]
    pub async fn lookup(&self, name: &str) -> DomainResult<Option<CompoundRecord>> {
        for variant in name_variants(name) {
            match self.lookup_single(&variant).await {
                Ok(Some(mut record)) => {
                    record.name = name.trim().to_string();
                    debug!(cid = ?record.key, "compound resolved");
                    return Ok(Some(record));
                }
                Ok(None) => {}
                Err(e) => warn!(variant = %variant, error = %e, "compound lookup failed"),
            }
        }
        Ok(None)
    }

    /// Properties for a list of CIDs, fetched in batches.
    pub async fn properties(&self, cids: &[u64]) -> DomainResult<Vec<CompoundRecord>> {
        let mut records = Vec::with_capacity(cids.len());
        for batch in cids.chunks(PROPERTY_BATCH) {
            let list = batch
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let url = format!(
                "{}/compound/cid/{list}/property/{PROPERTIES}/JSON",
                self.base_url
            );
            match self.get_json::<PropertyEnvelope>(&url).await {
                Ok(Some(envelope)) => records.extend(
                    envelope
                        .table
                        .properties
                        .into_iter()
                        .map(|p| p.into_record(None))
                        .filter(|r| !r.structure.is_empty()),
                ),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "property batch failed"),
            }
        }
        Ok(records)
    }

    /// Compounds with a similar 3-D shape to `cid`.
    #[instrument(skip(self))]
    pub async fn similar(&self, cid: &str, limit: usize) -> DomainResult<Vec<CompoundRecord>> {
        let url = format!(
            "{}/compound/fastsimilarity_3d/cid/{}/cids/JSON?MaxRecords={limit}",
            self.base_url,
            encode_segment(cid)
        );
        let envelope: Option<IdentifierEnvelope> = self.get_json(&url).await?;
        let cids: Vec<u64> = envelope
            .map(|e| e.list.cids)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.to_string() != cid)
            .take(limit)
            .collect();
        if cids.is_empty() {
            return Ok(Vec::new());
        }
        self.properties(&cids).await
    }

    /// Bioactive compounds for a gene symbol (assay actives, then
    /// pharmacologically active compounds as a fallback).
    #[instrument(skip(self))]
    pub async fn target_compounds(&self, protein: &str) -> DomainResult<Vec<CompoundRecord>> {
        let gene = protein.split_whitespace().next().unwrap_or(protein);
        let encoded = encode_segment(gene);
        let urls = [
            format!(
                "{}/assay/target/genesymbol/{encoded}/cids/JSON?cids_type=active",
                self.base_url
            ),
            format!(
                "{}/gene/symbol/{encoded}/cids/JSON?cids_type=pharmacologically_active",
                self.base_url
            ),
        ];

        let mut cids: Vec<u64> = Vec::new();
        for url in &urls {
            match self.get_json::<InformationEnvelope>(url).await {
                Ok(Some(envelope)) => {
                    for info in envelope.list.information {
                        for cid in info.cids {
                            if !cids.contains(&cid) {
                                cids.push(cid);
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(gene, error = %e, "bioactive compound search failed"),
            }
            if !cids.is_empty() {
                break;
            }
        }
        cids.truncate(self.max_target_compounds);
        if cids.is_empty() {
            return Ok(Vec::new());
        }
        self.properties(&cids).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client(server: &mockito::Server) -> PubChemClient {
        let config = PubChemConfig {
            base_url: server.url(),
            requests_per_second: 100,
            max_target_compounds: 5,
        };
        let retry = RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        PubChemClient::new(&config, &retry).unwrap()
    }

    #[test]
    fn test_name_variants() {
        assert_eq!(
            name_variants("daraxonrasib (RMC-6236)"),
            vec!["daraxonrasib (RMC-6236)", "daraxonrasib", "RMC-6236"]
        );
        assert_eq!(name_variants("aspirin"), vec!["aspirin"]);
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_alias() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/compound/name/daraxonrasib%20%28RMC-6236%29/property/CanonicalSMILES,IUPACName,MolecularFormula/JSON")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/compound/name/daraxonrasib/property/CanonicalSMILES,IUPACName,MolecularFormula/JSON")
            .with_body(
                json!({"PropertyTable": {"Properties": [{"CID": 164, "ConnectivitySMILES": "CCN"}]}})
                    .to_string(),
            )
            .create_async()
            .await;

        let record = client(&server)
            .lookup("daraxonrasib (RMC-6236)")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "daraxonrasib (RMC-6236)");
        assert_eq!(record.structure, "CCN");
        assert_eq!(record.key.as_deref(), Some("164"));
    }

    #[tokio::test]
    async fn test_similar_fetches_properties() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/compound/fastsimilarity_3d/cid/2244/cids/JSON")
            .match_query(mockito::Matcher::UrlEncoded("MaxRecords".into(), "3".into()))
            .with_body(json!({"IdentifierList": {"CID": [2244, 338, 6101]}}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/compound/cid/338,6101/property/CanonicalSMILES,IUPACName,MolecularFormula/JSON")
            .with_body(
                json!({"PropertyTable": {"Properties": [
                    {"CID": 338, "CanonicalSMILES": "OC1=CC", "IUPACName": "2-hydroxybenzoic acid"},
                    {"CID": 6101, "CanonicalSMILES": ""}
                ]}})
                .to_string(),
            )
            .create_async()
            .await;

        let records = client(&server).similar("2244", 3).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "2-hydroxybenzoic acid");
    }
}
