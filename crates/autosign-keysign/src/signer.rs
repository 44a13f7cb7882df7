//! Keysign Signer: one threshold-signature session per `sign` call.
//!
//! 1. Generate the session id and encryption key.
//! 2. Hand the request to every emitter, in order.
//! 3. Poll the relay until exactly the expected parties joined, then start.
//! 4. Poll until every party completed and every message has a signature.
//!
//! Every wait is bounded by the caller's cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use autosign_core::config::KeysignConfig;
use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::{Emitter, Relay};
use autosign_core::types::{KeysignMessage, KeysignRequest, Signature};

const ENCRYPTION_KEY_BYTES: usize = 32;

/// Relay lookup key of a message: hex SHA-256 of its payload.
pub fn message_id(msg: &KeysignMessage) -> String {
    hex::encode(Sha256::digest(msg.message.as_bytes()))
}

fn generate_encryption_key() -> String {
    let mut key = [0u8; ENCRYPTION_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

pub struct Signer {
    relay: Arc<dyn Relay>,
    emitters: Vec<Arc<dyn Emitter>>,
    party_prefixes: Vec<String>,
    poll_interval: Duration,
}

impl Signer {
    /// `party_prefixes` are matched literally; duplicates are dropped.
    pub fn new(relay: Arc<dyn Relay>, emitters: Vec<Arc<dyn Emitter>>, party_prefixes: Vec<String>) -> Self {
        let mut prefixes: Vec<String> = Vec::with_capacity(party_prefixes.len());
        for p in party_prefixes {
            if !prefixes.contains(&p) {
                prefixes.push(p);
            }
        }
        Self {
            relay,
            emitters,
            party_prefixes: prefixes,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(relay: Arc<dyn Relay>, emitters: Vec<Arc<dyn Emitter>>, cfg: &KeysignConfig) -> Self {
        Self::new(relay, emitters, cfg.party_prefixes.clone()).with_poll_interval(cfg.poll_interval())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn party_prefixes(&self) -> &[String] {
        &self.party_prefixes
    }

    /// Run a full session and return signatures keyed by message hash.
    pub async fn sign(&self, cancel: &CancellationToken, mut req: KeysignRequest) -> Result<HashMap<String, Signature>> {
        if !req.session_id.is_empty() {
            return Err(AutosignError::InvalidRequest("session_id must be empty".into()));
        }
        if !req.hex_encryption_key.is_empty() {
            return Err(AutosignError::InvalidRequest("hex_encryption_key must be empty".into()));
        }
        req.session_id = uuid::Uuid::new_v4().to_string();
        req.hex_encryption_key = generate_encryption_key();

        tracing::info!(
            "✍️ Keysign session {} for policy {} ({} message(s))",
            req.session_id,
            req.policy_id,
            req.messages.len()
        );

        for emitter in &self.emitters {
            emitter.sign(&req).await.map_err(|e| match e {
                AutosignError::Emitter { .. } => e,
                other => AutosignError::emitter(emitter.name(), other),
            })?;
        }

        let parties = self.wait_parties_and_start(cancel, &req.session_id).await?;
        let signatures = self.wait_result(cancel, &req, &parties).await?;
        tracing::info!("✅ Keysign session {} produced {} signature(s)", req.session_id, signatures.len());
        Ok(signatures)
    }

    async fn wait_parties_and_start(&self, cancel: &CancellationToken, session_id: &str) -> Result<Vec<String>> {
        let expected = self.party_prefixes.len();
        loop {
            if cancel.is_cancelled() {
                return Err(AutosignError::Cancelled);
            }
            let joined: Vec<String> = self
                .relay
                .get_session(session_id)
                .await?
                .into_iter()
                .filter(|party| self.party_prefixes.iter().any(|prefix| party.starts_with(prefix.as_str())))
                .collect();

            if joined.len() > expected {
                return Err(AutosignError::Protocol(format!(
                    "session {session_id}: {} parties joined, expected {expected}: {joined:?}",
                    joined.len()
                )));
            }
            if joined.len() == expected {
                self.relay.start_session(session_id, &joined).await?;
                return Ok(joined);
            }
            tracing::debug!("session {session_id}: {}/{expected} parties joined", joined.len());
            self.pause(cancel).await?;
        }
    }

    async fn wait_result(
        &self,
        cancel: &CancellationToken,
        req: &KeysignRequest,
        parties: &[String],
    ) -> Result<HashMap<String, Signature>> {
        let session_id = req.session_id.as_str();
        let mut resolved: HashMap<String, Signature> = HashMap::with_capacity(req.messages.len());
        loop {
            if cancel.is_cancelled() {
                return Err(AutosignError::Cancelled);
            }
            if self.relay.check_completed_parties(session_id, parties).await? {
                for msg in &req.messages {
                    if resolved.contains_key(&msg.hash) {
                        continue;
                    }
                    let id = message_id(msg);
                    match self.relay.check_keysign_complete(session_id, &id).await {
                        Ok(Some(sig)) => {
                            resolved.insert(msg.hash.clone(), sig);
                        }
                        Ok(None) => {
                            return Err(AutosignError::Protocol(format!(
                                "session {session_id}: relay returned no signature for message {id}"
                            )));
                        }
                        Err(e) => tracing::debug!("session {session_id}: message {id} pending: {e}"),
                    }
                }
                if req.messages.iter().all(|m| resolved.contains_key(&m.hash)) {
                    return Ok(resolved);
                }
            }
            self.pause(cancel).await?;
        }
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AutosignError::Cancelled),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autosign_core::types::{Chain, HashFunction};
    use autosign_core::util::Locked;
    use uuid::Uuid;

    /// Scripted relay: joined parties per poll, completion after N polls,
    /// and per message id the poll on which its signature appears.
    #[derive(Default)]
    struct ScriptedRelay {
        joins: Vec<Vec<String>>,
        complete_after: usize,
        ready_on_poll: HashMap<String, usize>,
        null_signature: bool,
        session_polls: Locked<usize>,
        completion_polls: Locked<usize>,
        started: Locked<Option<(String, Vec<String>)>>,
        lookups: Locked<HashMap<String, usize>>,
    }

    fn signature(tag: &str) -> Signature {
        Signature {
            msg: tag.into(),
            r: "r".into(),
            s: "s".into(),
            der_signature: format!("der-{tag}"),
            recovery_id: "00".into(),
        }
    }

    #[async_trait]
    impl Relay for ScriptedRelay {
        async fn get_session(&self, _session_id: &str) -> Result<Vec<String>> {
            let poll = self.session_polls.with(|p| {
                *p += 1;
                *p
            });
            let idx = (poll - 1).min(self.joins.len().saturating_sub(1));
            Ok(self.joins.get(idx).cloned().unwrap_or_default())
        }

        async fn start_session(&self, session_id: &str, parties: &[String]) -> Result<()> {
            self.started.set(Some((session_id.to_string(), parties.to_vec())));
            Ok(())
        }

        async fn check_completed_parties(&self, _session_id: &str, _parties: &[String]) -> Result<bool> {
            let poll = self.completion_polls.with(|p| {
                *p += 1;
                *p
            });
            Ok(poll > self.complete_after)
        }

        async fn check_keysign_complete(&self, _session_id: &str, message_id: &str) -> Result<Option<Signature>> {
            let lookup = self.lookups.with(|l| {
                let n = l.entry(message_id.to_string()).or_insert(0);
                *n += 1;
                *n
            });
            if self.null_signature {
                return Ok(None);
            }
            match self.ready_on_poll.get(message_id) {
                Some(ready) if lookup >= *ready => Ok(Some(signature(message_id))),
                _ => Err(AutosignError::Relay("not yet".into())),
            }
        }
    }

    #[derive(Default)]
    struct CountingEmitter {
        name: String,
        fail: bool,
        calls: Locked<Vec<KeysignRequest>>,
    }

    #[async_trait]
    impl Emitter for CountingEmitter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn sign(&self, req: &KeysignRequest) -> Result<()> {
            self.calls.with(|c| c.push(req.clone()));
            if self.fail {
                return Err(AutosignError::Other("verifier down".into()));
            }
            Ok(())
        }
    }

    fn message(payload: &str, hash: &str) -> KeysignMessage {
        KeysignMessage {
            message: payload.into(),
            hash: hash.into(),
            hash_function: HashFunction::Sha256,
            chain: Chain::Ethereum,
        }
    }

    fn request(messages: Vec<KeysignMessage>) -> KeysignRequest {
        KeysignRequest {
            public_key: "02abc".into(),
            messages,
            session_id: String::new(),
            hex_encryption_key: String::new(),
            policy_id: Uuid::new_v4(),
            plugin_id: "dca".into(),
        }
    }

    fn parties(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn signer(relay: Arc<ScriptedRelay>, emitters: Vec<Arc<dyn Emitter>>) -> Signer {
        Signer::new(relay, emitters, parties(&["verifier-", "dca-", "verifier-"]))
            .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_messages_resolve_on_different_polls() {
        let m1 = message("tx-one", "h1");
        let m2 = message("tx-two", "h2");
        let relay = Arc::new(ScriptedRelay {
            joins: vec![
                parties(&["verifier-a"]),
                parties(&["verifier-a", "dca-b", "observer-c"]),
            ],
            complete_after: 1,
            ready_on_poll: HashMap::from([(message_id(&m1), 1), (message_id(&m2), 3)]),
            ..Default::default()
        });
        let emitter = Arc::new(CountingEmitter {
            name: "plugin".into(),
            ..Default::default()
        });
        let s = signer(relay.clone(), vec![emitter.clone() as Arc<dyn Emitter>]);

        let out = s.sign(&CancellationToken::new(), request(vec![m1.clone(), m2.clone()])).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out["h1"], signature(&message_id(&m1)));
        assert_eq!(out["h2"], signature(&message_id(&m2)));

        // Resolved messages are not asked for again.
        let lookups = relay.lookups.get();
        assert_eq!(lookups[&message_id(&m1)], 1);
        assert_eq!(lookups[&message_id(&m2)], 3);

        let (session, started_with) = relay.started.get().unwrap();
        assert_eq!(started_with, parties(&["verifier-a", "dca-b"]));

        let sent = emitter.calls.get();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session_id, session);
        assert_eq!(sent[0].hex_encryption_key.len(), ENCRYPTION_KEY_BYTES * 2);
        assert!(hex::decode(&sent[0].hex_encryption_key).is_ok());
    }

    #[tokio::test]
    async fn test_prefilled_session_rejected_before_emitters() {
        let relay = Arc::new(ScriptedRelay::default());
        let emitter = Arc::new(CountingEmitter::default());
        let s = signer(relay, vec![emitter.clone() as Arc<dyn Emitter>]);

        let mut req = request(vec![message("p", "h")]);
        req.session_id = "mine".into();
        let err = s.sign(&CancellationToken::new(), req).await.unwrap_err();
        assert!(matches!(err, AutosignError::InvalidRequest(_)));

        let mut req = request(vec![message("p", "h")]);
        req.hex_encryption_key = "abcd".into();
        let err = s.sign(&CancellationToken::new(), req).await.unwrap_err();
        assert!(matches!(err, AutosignError::InvalidRequest(_)));

        assert!(emitter.calls.get().is_empty());
    }

    #[tokio::test]
    async fn test_emitter_failure_aborts_in_order() {
        let relay = Arc::new(ScriptedRelay::default());
        let first = Arc::new(CountingEmitter {
            name: "verifier".into(),
            fail: true,
            ..Default::default()
        });
        let second = Arc::new(CountingEmitter {
            name: "plugin".into(),
            ..Default::default()
        });
        let s = signer(relay.clone(), vec![first.clone() as Arc<dyn Emitter>, second.clone()]);

        let err = s.sign(&CancellationToken::new(), request(vec![])).await.unwrap_err();
        assert!(matches!(err, AutosignError::Emitter { ref name, .. } if name == "verifier"));
        assert_eq!(first.calls.get().len(), 1);
        assert!(second.calls.get().is_empty());
        assert_eq!(relay.session_polls.get(), 0);
    }

    #[tokio::test]
    async fn test_too_many_parties_is_protocol_error() {
        let relay = Arc::new(ScriptedRelay {
            joins: vec![parties(&["verifier-a", "dca-b", "dca-c"])],
            ..Default::default()
        });
        let s = signer(relay.clone(), vec![]);
        let err = s.sign(&CancellationToken::new(), request(vec![])).await.unwrap_err();
        assert!(matches!(err, AutosignError::Protocol(_)));
        assert!(relay.started.get().is_none());
    }

    #[tokio::test]
    async fn test_null_signature_is_protocol_error() {
        let relay = Arc::new(ScriptedRelay {
            joins: vec![parties(&["verifier-a", "dca-b"])],
            null_signature: true,
            ..Default::default()
        });
        let s = signer(relay, vec![]);
        let err = s
            .sign(&CancellationToken::new(), request(vec![message("p", "h")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AutosignError::Protocol(ref m) if m.contains("no signature")));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_parties() {
        let relay = Arc::new(ScriptedRelay {
            joins: vec![parties(&["verifier-a"])],
            ..Default::default()
        });
        let s = signer(relay.clone(), vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = s.sign(&cancel, request(vec![])).await.unwrap_err();
        assert!(matches!(err, AutosignError::Cancelled));
        assert!(relay.session_polls.get() >= 1);
        assert!(relay.started.get().is_none());
    }

    #[test]
    fn test_prefixes_deduplicated() {
        let s = signer(Arc::new(ScriptedRelay::default()), vec![]);
        assert_eq!(s.party_prefixes(), &parties(&["verifier-", "dca-"])[..]);
    }

    #[test]
    fn test_message_id_is_content_hash() {
        let a = message("payload", "h1");
        let b = message("payload", "other-hash");
        assert_eq!(message_id(&a), message_id(&b));
        assert_eq!(
            message_id(&a),
            "239f59ed55e737c77147cf55ad0c1b030b6d7ee748a7426952f9b852d5a935e5"
        );
    }
}
