//! HTTP client for the session relay.
//!
//! Endpoints:
//! - `GET  /{session}`                      joined party ids
//! - `POST /start/{session}`                start with the listed parties
//! - `GET  /complete/{session}`             party ids that finished
//! - `GET  /complete/{session}/keysign`     signature for the `message_id` header

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::Relay;
use autosign_core::types::Signature;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpRelay {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelay {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AutosignError::Relay(format!("client init: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| AutosignError::Relay(format!("GET {url}: {e}")))
    }

    /// `None` on 404, parsed party list otherwise.
    async fn get_parties(&self, path: &str) -> Result<Option<Vec<String>>> {
        let resp = self.get(path).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        let parties = resp
            .json::<Vec<String>>()
            .await
            .map_err(|e| AutosignError::Relay(format!("malformed party list: {e}")))?;
        Ok(Some(parties))
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let url = resp.url().to_string();
    let text = resp.text().await.unwrap_or_default();
    Err(AutosignError::Relay(format!("{url} returned HTTP {status}: {text}")))
}

#[async_trait]
impl Relay for HttpRelay {
    async fn get_session(&self, session_id: &str) -> Result<Vec<String>> {
        // Nobody has registered yet.
        Ok(self.get_parties(session_id).await?.unwrap_or_default())
    }

    async fn start_session(&self, session_id: &str, parties: &[String]) -> Result<()> {
        let url = self.url(&format!("start/{session_id}"));
        let resp = self
            .client
            .post(&url)
            .json(parties)
            .send()
            .await
            .map_err(|e| AutosignError::Relay(format!("POST {url}: {e}")))?;
        ensure_success(resp).await?;
        tracing::info!("🚀 Session {session_id} started with {} parties", parties.len());
        Ok(())
    }

    async fn check_completed_parties(&self, session_id: &str, parties: &[String]) -> Result<bool> {
        let completed = match self.get_parties(&format!("complete/{session_id}")).await? {
            Some(completed) => completed,
            None => return Ok(false),
        };
        Ok(parties.iter().all(|p| completed.contains(p)))
    }

    async fn check_keysign_complete(&self, session_id: &str, message_id: &str) -> Result<Option<Signature>> {
        let url = self.url(&format!("complete/{session_id}/keysign"));
        let resp = self
            .client
            .get(&url)
            .header("message_id", message_id)
            .send()
            .await
            .map_err(|e| AutosignError::Relay(format!("GET {url}: {e}")))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(AutosignError::Relay(format!("signature for {message_id} not published yet")));
        }
        let text = ensure_success(resp)
            .await?
            .text()
            .await
            .map_err(|e| AutosignError::Relay(format!("read body: {e}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<Signature>>(&text)
            .map_err(|e| AutosignError::Relay(format!("malformed signature: {e}")))
    }
}
