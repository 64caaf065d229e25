//! Chat-completions collaborator (Perplexity-compatible API).
//!
//! One client serves as the literature source, the expansion reasoner's
//! hypothesis source, the class enumerator and the report writer. Model output
//! is free text, so every structured answer goes through [`extract_json`].

use std::fmt::Write as _;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::adapters::http::{build_client, resolve_api_key, truncate, HttpFailure, RetryPolicy};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChatConfig, DrugCandidate, RetryConfig, RunState};
use crate::domain::ports::{
    HypothesisSource, LiteratureReport, LiteratureSource, ReasoningRequest, ReportWriter,
};

pub const API_KEY_ENV: &str = "PERPLEXITY_API_KEY";

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());
static TRAILING_COMMA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").ok());

/// Best-effort JSON extraction from model text.
///
/// Tries the text as-is, then the first fenced block, then the span from the
/// first `{`/`[` to the last matching closer with trailing commas and control
/// characters removed.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let body = FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim());
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }

    let start = body.find(['{', '['])?;
    let closer = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(closer)?;
    if end < start {
        return None;
    }
    let span: String = body[start..=end]
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = TRAILING_COMMA
        .as_ref()
        .map_or_else(|| span.clone(), |re| re.replace_all(&span, "$1").into_owned());
    serde_json::from_str(&cleaned).ok()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractedLiterature {
    #[serde(default, alias = "proteins", alias = "targets")]
    protein_targets: Vec<String>,
    #[serde(default)]
    drugs: Vec<DrugCandidate>,
}

pub struct ChatClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Build from config. The API key falls back to `PERPLEXITY_API_KEY`.
    pub fn new(config: &ChatConfig, retry: &RetryConfig) -> DomainResult<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref(), API_KEY_ENV).ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "chat API key missing (set chat.api_key or {API_KEY_ENV})"
            ))
        })?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            retry: RetryPolicy::from(retry),
        })
    }

    /// One system + user exchange. Returns the first choice's content.
    pub async fn complete(&self, system: &str, user: &str) -> DomainResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = self.retry.run("chat", || self.send(&body)).await?;
        debug!(chars = reply.len(), "chat completion received");
        Ok(reply)
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<String, HttpFailure> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpFailure::from_status(status, &text));
        }
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HttpFailure::Permanent("response had no choices".to_string()))
    }

    /// Generic drug names in a therapeutic class, minus `exclude`.
    #[instrument(skip(self, exclude))]
    pub async fn enumerate_class(
        &self,
        class_name: &str,
        exclude: &[String],
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        let system = "You are a pharmacology expert. Return ONLY a JSON list of \
                      FDA-approved drug names (generic names). No explanation.";
        let user = format!(
            "List {limit} FDA-approved drugs in the class: {class_name}. \
             Exclude any already in this list: {}",
            serde_json::to_string(exclude)?
        );
        let reply = self.complete(system, &user).await?;
        let Some(Value::Array(items)) = extract_json(&reply) else {
            return Err(DomainError::collaborator(
                "chat",
                format!("class list unparseable: {}", truncate(&reply, 200)),
            ));
        };

        let excluded: Vec<String> = exclude.iter().map(|s| s.to_ascii_lowercase()).collect();
        Ok(items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty() && !excluded.contains(&s.to_ascii_lowercase()))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl LiteratureSource for ChatClient {
    #[instrument(skip(self))]
    async fn discover(&self, subject: &str) -> DomainResult<LiteratureReport> {
        let review = self
            .complete(
                "You are an expert biomedical researcher. Write a detailed, scholarly \
                 literature review in Markdown with inline numbered citations.",
                &format!(
                    "Write a comprehensive literature review about **{subject}**.\n\n\
                     Include:\n1. Introduction\n2. Molecular and genetic landscape\n\
                     3. **Key protein targets** for treatment\n\
                     4. FDA-approved drugs and repurposing candidates\n5. References"
                ),
            )
            .await?;

        let extraction = self
            .complete(
                "You extract structured data from biomedical text. Return ONLY valid JSON.",
                &format!(
                    "From the review below, return a JSON object with:\n\
                     \"protein_targets\": list of gene symbols of druggable protein targets,\n\
                     \"drugs\": list of {{\"drug\", \"proteins\", \"mechanism\", \"fda_status\"}}.\n\n\
                     Review:\n{review}"
                ),
            )
            .await?;

        let extracted: ExtractedLiterature = extract_json(&extraction)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Ok(LiteratureReport {
            protein_targets: extracted.protein_targets,
            drugs: extracted.drugs,
            review_text: review,
        })
    }
}

#[async_trait]
impl HypothesisSource for ChatClient {
    #[instrument(skip(self, request), fields(round = request.round))]
    async fn decide(&self, request: &ReasoningRequest) -> DomainResult<Value> {
        let cap = request.max_rounds + 1;
        let system = format!(
            "You are a computational pharmacology researcher analyzing molecular docking \
             results for drug repurposing. You must return ONLY valid JSON.\n\n\
             Look for patterns: drugs of one therapeutic class clustering among top hits, \
             shared structural features, unexplored classes.\n\n\
             Return a JSON object with:\n\
             \"action\": one of \"expand_by_similarity\", \"expand_by_class\", \"proceed\"\n\
             \"rationale\": your analysis (2-3 sentences)\n\
             \"hypothesis\": one specific scientific hypothesis\n\
             \"seed_cids\": list of PubChem CIDs (for expand_by_similarity)\n\
             \"drug_class\": class name (for expand_by_class)\n\
             \"drug_names\": list of drug names (for expand_by_class)\n\n\
             This is round {}. If round >= {cap}, you MUST choose \"proceed\". \
             Only expand on a clear pattern.",
            request.round
        );

        let summary: Vec<Value> = request
            .top_results
            .iter()
            .map(|r| {
                json!({
                    "name": r.ligand_name,
                    "score": (r.confidence_score * 10_000.0).round() / 10_000.0,
                    "mechanism": truncate(&r.mechanism, 100),
                    "fda_status": truncate(&r.approval_status, 60),
                    "protein": r.target_id,
                    "source": r.provenance,
                    "round": r.round,
                })
            })
            .collect();

        let mut user = String::new();
        let _ = writeln!(user, "Subject: {}", request.subject);
        let _ = writeln!(user, "Round: {}", request.round);
        let _ = writeln!(user, "Previous hypotheses: {}", serde_json::to_string(&request.hypotheses)?);
        let _ = writeln!(user, "Previous expansions: {}\n", serde_json::to_string(&request.history)?);
        let _ = writeln!(
            user,
            "Top {} of {} docking results (sorted by confidence):\n{}",
            summary.len(),
            request.total_results,
            serde_json::to_string_pretty(&summary)?
        );
        user.push_str("\nAnalyze these results and return your decision as JSON.");

        let reply = self.complete(&system, &user).await?;
        extract_json(&reply).ok_or_else(|| {
            DomainError::collaborator(
                "chat",
                format!("decision unparseable: {}", truncate(&reply, 200)),
            )
        })
    }
}

#[async_trait]
impl ReportWriter for ChatClient {
    #[instrument(skip(self, state))]
    async fn write_report(&self, state: &RunState) -> DomainResult<String> {
        let top: Vec<Value> = state
            .top_results(50)
            .into_iter()
            .map(|r| {
                json!({
                    "ligand": r.ligand_name,
                    "target": r.target_id,
                    "structure": r.structure_id,
                    "confidence": r.confidence_score,
                    "mechanism": r.mechanism,
                    "fda_status": r.approval_status,
                    "round": r.round,
                })
            })
            .collect();
        let failures: Vec<Value> = state
            .targets
            .iter()
            .flat_map(|t| {
                t.failures
                    .iter()
                    .map(move |f| json!({"target": t.id, "round": f.round, "kind": f.kind, "detail": f.detail}))
            })
            .collect();

        self.complete(
            "You are a computational drug discovery scientist. Write a Markdown results \
             section for a docking-based drug repurposing study. Be precise and do not \
             invent numbers.",
            &format!(
                "Subject: {}\nDocking rounds: {}\nTotal results: {}\n\n\
                 Top results:\n{}\n\nTargets without results:\n{}\n\n\
                 Include an overview, a per-target ranked table, and a discussion of \
                 drug classes among the top hits.",
                state.subject,
                state.round,
                state.accumulated_results.len(),
                serde_json::to_string_pretty(&top)?,
                serde_json::to_string_pretty(&failures)?
            ),
        )
        .await
    }

    #[instrument(skip(self, state))]
    async fn write_paper(&self, state: &RunState) -> DomainResult<String> {
        self.complete(
            "You are a scientific writer. Combine the literature review and the results \
             into one coherent Markdown paper with abstract, introduction, methods, \
             results, discussion and references. Keep all numbers as given.",
            &format!(
                "Subject: {}\n\n## Literature review\n{}\n\n## Results\n{}",
                state.subject, state.review_text, state.report_text
            ),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::Server) -> ChatClient {
        let config = ChatConfig {
            base_url: server.url(),
            api_key: Some("pplx".into()),
            ..ChatConfig::default()
        };
        let retry = RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        ChatClient::new(&config, &retry).unwrap()
    }

    fn reply(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[test]
    fn test_extract_json_plain_and_fenced() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"action\": \"proceed\"}\n```\nThanks"),
            Some(json!({"action": "proceed"}))
        );
    }

    #[test]
    fn test_extract_json_repairs_trailing_commas() {
        let text = "Decision: {\"action\": \"expand_class\", \"drug_names\": [\"a\", \"b\",],}";
        assert_eq!(
            extract_json(text),
            Some(json!({"action": "expand_class", "drug_names": ["a", "b"]}))
        );
        assert_eq!(extract_json("[\"x\",\n\"y\",]"), Some(json!(["x", "y"])));
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_complete_sends_model_and_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer pplx")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "sonar-pro",
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi"}]
            })))
            .with_body(reply("hello"))
            .create_async()
            .await;

        assert_eq!(client(&server).complete("sys", "hi").await.unwrap(), "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_enumerate_class_filters_excluded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_body(reply("```json\n[\"atorvastatin\", \"Simvastatin\", \"rosuvastatin\"]\n```"))
            .create_async()
            .await;

        let names = client(&server)
            .enumerate_class("statins", &["simvastatin".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(names, vec!["atorvastatin", "rosuvastatin"]);
    }

    #[tokio::test]
    async fn test_unparseable_decision_is_collaborator_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_body(reply("I think we should keep going."))
            .create_async()
            .await;

        let request = ReasoningRequest {
            subject: "glioma".into(),
            round: 1,
            max_rounds: 2,
            top_results: Vec::new(),
            total_results: 0,
            targets: vec!["EGFR".into()],
            history: Vec::new(),
            hypotheses: Vec::new(),
        };
        let result = client(&server).decide(&request).await;
        assert!(matches!(result, Err(DomainError::Collaborator { .. })));
    }

    #[tokio::test]
    async fn test_literature_extracts_targets() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("literature review".into()))
            .with_body(reply("# Review\nEGFR and IDH1 matter."))
            .create_async()
            .await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("extract structured data".into()))
            .with_body(reply(
                "{\"protein_targets\": [\"EGFR\", \"IDH1\"], \"drugs\": [{\"drug\": \"erlotinib\", \"proteins\": [\"EGFR\"], \"mechanism\": \"TKI\", \"fda_status\": \"approved\"}]}",
            ))
            .create_async()
            .await;

        let report = client(&server).discover("glioma").await.unwrap();
        assert_eq!(report.protein_targets, vec!["EGFR", "IDH1"]);
        assert_eq!(report.drugs[0].drug, "erlotinib");
        assert!(report.review_text.starts_with("# Review"));
    }
}
