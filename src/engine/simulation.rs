use super::SimulationService;
use crate::error::{ArtifactError, StartError};
use crate::model::{RoundResult, RunConfig, RunRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};

/// HTTP client for the simulation engine and its artifact file server.
#[derive(Clone)]
pub struct SimulationClient {
    pub http: reqwest::Client,
    engine_url: Url,
    artifact_url: Url,
}

impl SimulationClient {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            engine_url: parse_base(&cfg.engine_url).context("invalid engine url")?,
            artifact_url: parse_base(&cfg.artifact_url).context("invalid artifact url")?,
        })
    }

    pub fn simulate_url(&self, request: &RunRequest) -> Url {
        let mut url = self
            .engine_url
            .join("simulate")
            .unwrap_or_else(|_| self.engine_url.clone());
        url.query_pairs_mut()
            .append_pair("mode", request.mode.as_query_str())
            .append_pair("rounds", &request.rounds.to_string());
        url
    }

    pub fn round_url(&self, index: u32) -> Url {
        self.artifact(&format!("round_{index}_results.json"))
    }

    /// Resolve a relative artifact path (as found in `images`) against the file server.
    pub fn artifact(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        self.artifact_url
            .join(path)
            .unwrap_or_else(|_| self.artifact_url.clone())
    }

    /// Whether an image artifact can be served. Any failure counts as missing.
    pub async fn image_available(&self, path: &str) -> bool {
        match self.http.head(self.artifact(path)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("image {path} unavailable: {e}");
                false
            }
        }
    }
}

/// Parse a base URL so that `join` appends to it instead of replacing its last segment.
fn parse_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl SimulationService for SimulationClient {
    async fn start(&self, request: &RunRequest) -> Result<(), StartError> {
        let url = self.simulate_url(request);
        log::info!("starting simulation: {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StartError::new(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StartError::new(format!("HTTP {}", status.as_u16())));
        }
        Ok(())
    }

    async fn fetch_round(&self, index: u32) -> Result<RoundResult, ArtifactError> {
        let resp = self
            .http
            .get(self.round_url(index))
            .send()
            .await
            .map_err(|e| ArtifactError::Transport(e.to_string()))?;
        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(ArtifactError::NotFound),
            s => return Err(ArtifactError::Status(s.as_u16())),
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| ArtifactError::Transport(e.to_string()))?;
        let round: RoundResult = serde_json::from_slice(&body)
            .map_err(|e| ArtifactError::Malformed(e.to_string()))?;
        round.validate().map_err(ArtifactError::Malformed)?;
        Ok(round)
    }
}
