//! Emitters hand a finalized keysign request to one cosigning party.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use autosign_core::config::VerifierEmitterConfig;
use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{EnqueueOptions, Emitter, TASK_TYPE_KEYSIGN, Task, TaskQueue};
use autosign_core::types::KeysignRequest;

const SIGN_PATH: &str = "/plugin-signer/sign";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs the request to a remote verifier.
pub struct HttpEmitter {
    name: String,
    url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpEmitter {
    pub fn new(name: &str, base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AutosignError::emitter(name, format!("client init: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            url: format!("{}{SIGN_PATH}", base_url.trim_end_matches('/')),
            token: token.to_string(),
            client,
        })
    }

    pub fn from_config(cfg: &VerifierEmitterConfig) -> Result<Self> {
        Self::new("verifier", &cfg.url, &cfg.token)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }
}

#[async_trait]
impl Emitter for HttpEmitter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sign(&self, req: &KeysignRequest) -> Result<()> {
        let resp = self
            .apply_auth(self.client.post(&self.url).json(req))
            .send()
            .await
            .map_err(|e| AutosignError::emitter(&self.name, format!("{} unreachable: {e}", self.url)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AutosignError::emitter(&self.name, format!("HTTP {status}: {text}")));
        }
        tracing::debug!("📤 {} accepted session {}", self.name, req.session_id);
        Ok(())
    }
}

/// Enqueues the request for a local plugin worker.
pub struct QueueEmitter {
    name: String,
    queue: Arc<dyn TaskQueue>,
    opts: EnqueueOptions,
}

impl QueueEmitter {
    pub fn new(queue: Arc<dyn TaskQueue>, queue_name: &str) -> Self {
        Self {
            name: format!("queue:{queue_name}"),
            queue,
            opts: EnqueueOptions::fire_once(queue_name),
        }
    }
}

#[async_trait]
impl Emitter for QueueEmitter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sign(&self, req: &KeysignRequest) -> Result<()> {
        let task = Task::new(TASK_TYPE_KEYSIGN, req)?;
        let info = self
            .queue
            .enqueue(task, &self.opts)
            .await
            .map_err(|e| AutosignError::emitter(&self.name, e))?;
        tracing::debug!("📤 Session {} queued as task {}", req.session_id, info.id);
        Ok(())
    }
}
