//! Base-URL discovery (C10 calls this before constructing the gateway).
//! Ports `_create_vllm_client`'s candidate construction: preferred URL;
//! preferred with `localhost`/`127.0.0.1` rewritten to a container-escape
//! host (`host.docker.internal`, the conventional escape hatch when the
//! harness itself runs inside a container but the model server runs on
//! the docker host); `VLLM_BASE_URL` env override and its normalized
//! form; a hardcoded fallback pair — deduplicated in order, each probed
//! with `GET /v1/models`.

use std::time::Duration;

use serde::Deserialize;

use crate::errors::GatewayError;

const FALLBACK_PRIMARY: &str = "http://localhost:8000";
const FALLBACK_SECONDARY: &str = "http://host.docker.internal:8000";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Rewrites `localhost`/`127.0.0.1` host components to `host.docker.internal`
/// so a containerized harness can reach a model server on the docker host.
fn normalize_for_container(url: &str) -> Option<String> {
    if url.contains("localhost") {
        Some(url.replacen("localhost", "host.docker.internal", 1))
    } else if url.contains("127.0.0.1") {
        Some(url.replacen("127.0.0.1", "host.docker.internal", 1))
    } else {
        None
    }
}

/// Builds the ordered, deduplicated candidate list per §4.4.
pub fn candidate_urls(preferred: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(preferred) = preferred {
        candidates.push(preferred.trim_end_matches('/').to_string());
        if let Some(normalized) = normalize_for_container(preferred) {
            candidates.push(normalized.trim_end_matches('/').to_string());
        }
    }

    if let Ok(env_url) = std::env::var("VLLM_BASE_URL") {
        candidates.push(env_url.trim_end_matches('/').to_string());
        if let Some(normalized) = normalize_for_container(&env_url) {
            candidates.push(normalized.trim_end_matches('/').to_string());
        }
    }

    candidates.push(FALLBACK_PRIMARY.to_string());
    candidates.push(FALLBACK_SECONDARY.to_string());

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Probes `GET {candidate}/v1/models`, accepting a candidate whose
/// `data[].id` list is empty (server doesn't report models, assume ok)
/// or contains `model_id`.
fn probe(client: &reqwest::blocking::Client, candidate: &str, model_id: &str) -> Result<bool, String> {
    let url = format!("{candidate}/v1/models");
    let resp = client.get(&url).timeout(PROBE_TIMEOUT).send().map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("http {}", resp.status()));
    }
    let body: ModelsResponse = resp.json().map_err(|e| e.to_string())?;
    Ok(body.data.is_empty() || body.data.iter().any(|m| m.id == model_id))
}

/// Finds the first reachable, model-matching candidate. Fails the run
/// with a composed diagnostic listing every candidate tried when none
/// succeed.
pub fn discover_base_url(preferred: Option<&str>, model_id: &str) -> Result<String, GatewayError> {
    let client = reqwest::blocking::Client::new();
    let candidates = candidate_urls(preferred);
    let mut attempts = Vec::new();

    for candidate in &candidates {
        match probe(&client, candidate, model_id) {
            Ok(true) => {
                tracing::info!(base_url = %candidate, "vLLM endpoint discovered");
                return Ok(candidate.clone());
            }
            Ok(false) => attempts.push(format!("{candidate}: model not listed")),
            Err(e) => attempts.push(format!("{candidate}: {e}")),
        }
    }

    Err(GatewayError::Unreachable {
        model: model_id.to_string(),
        candidates: candidates.clone(),
        detail: attempts.join("; "),
    })
}
