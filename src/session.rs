use std::sync::Arc;

use uuid::Uuid;

use crate::credential::CredentialStore;
use crate::error::ChatError;
use crate::models::{ChatModel, ChunkStream, ModelConnector, ModelRequest, Turn};
use crate::settings::{resolve_credential, ModelParams};

/// A remote conversation context: persona, sampling parameters and the
/// exchanges completed so far.
pub struct ChatSession {
    pub id: Uuid,
    model: Arc<dyn ChatModel>,
    model_name: String,
    persona: String,
    params: ModelParams,
    history: Vec<Turn>,
}

impl ChatSession {
    /// Sends `text` after the recorded history and returns the reply stream.
    pub async fn send_streaming(&self, text: &str) -> Result<ChunkStream, ChatError> {
        let mut turns = self.history.clone();
        turns.push(Turn::user(text));
        let req = ModelRequest {
            model: self.model_name.clone(),
            system_instruction: self.persona.clone(),
            turns,
            params: self.params.clone(),
        };
        self.model.stream_generate(req).await
    }

    /// Remembers a fully streamed exchange so later turns carry context.
    pub fn record_exchange(&mut self, user: &str, reply: &str) {
        self.history.push(Turn::user(user));
        self.history.push(Turn::model(reply));
    }
}

/// Owns at most one model client (bound to one credential) and at most
/// one session on top of it.
pub struct SessionClient {
    connector: Arc<dyn ModelConnector>,
    store: Arc<dyn CredentialStore>,
    deploy_default: Option<String>,
    model_name: String,
    persona: String,
    params: ModelParams,
    client: Option<Arc<dyn ChatModel>>,
    session: Option<ChatSession>,
}

impl SessionClient {
    pub fn new(
        connector: Arc<dyn ModelConnector>,
        store: Arc<dyn CredentialStore>,
        deploy_default: Option<String>,
        model_name: impl Into<String>,
        persona: impl Into<String>,
        params: ModelParams,
    ) -> Self {
        Self {
            connector,
            store,
            deploy_default,
            model_name: model_name.into(),
            persona: persona.into(),
            params,
            client: None,
            session: None,
        }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    #[cfg(test)]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Binds a fresh client to `credential` and drops the current session.
    pub fn initialize(&mut self, credential: &str) {
        let credential = credential.trim();
        if credential.is_empty() {
            return;
        }
        self.client = Some(self.connector.connect(credential));
        self.session = None;
        tracing::info!(model = %self.model_name, "model client initialized");
    }

    pub async fn get_or_create_session(&mut self) -> Result<&mut ChatSession, ChatError> {
        if self.client.is_none() {
            let stored = self.store.load().await.map_err(|e| ChatError::Store(e.to_string()))?;
            let credential = resolve_credential(stored.as_deref(), self.deploy_default.as_deref())
                .ok_or(ChatError::MissingCredential)?;
            self.initialize(&credential);
        }
        let model = self.client.clone().ok_or(ChatError::MissingCredential)?;
        let session = self.session.get_or_insert_with(|| {
            let session = ChatSession {
                id: Uuid::new_v4(),
                model,
                model_name: self.model_name.clone(),
                persona: self.persona.clone(),
                params: self.params.clone(),
                history: Vec::new(),
            };
            tracing::debug!(session_id = %session.id, "chat session created");
            session
        });
        Ok(session)
    }

    /// Starts a new session on the same client. Recreation is attempted
    /// right away; if that fails the next send creates it lazily.
    pub async fn reset(&mut self) {
        self.session = None;
        if let Err(e) = self.get_or_create_session().await {
            tracing::debug!(error = %e, "session recreation deferred");
        }
    }

    /// Forgets client and session, e.g. after the credential was removed.
    pub fn discard(&mut self) {
        self.client = None;
        self.session = None;
        tracing::info!("model client discarded");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;

    /// What a scripted model does for one call.
    pub enum Script {
        Chunks(Vec<&'static str>),
        FailAfter(Vec<&'static str>, ChatError),
        Reject(ChatError),
    }

    #[derive(Default)]
    pub struct FakeConnector {
        pub scripts: Mutex<VecDeque<Script>>,
        pub credentials: Mutex<Vec<String>>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    impl FakeConnector {
        pub fn with_scripts(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self { scripts: Mutex::new(scripts.into()), ..Default::default() })
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    struct FakeModel {
        connector: Arc<FakeConnector>,
    }

    impl ModelConnector for Arc<FakeConnector> {
        fn connect(&self, credential: &str) -> Arc<dyn ChatModel> {
            self.credentials.lock().unwrap().push(credential.to_string());
            Arc::new(FakeModel { connector: self.clone() })
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn stream_generate(&self, req: ModelRequest) -> Result<ChunkStream, ChatError> {
            self.connector.requests.lock().unwrap().push(req);
            let script = self.connector.scripts.lock().unwrap().pop_front();
            match script.unwrap_or(Script::Chunks(vec![])) {
                Script::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(|c| Ok::<_, ChatError>(c.to_string()))))),
                Script::FailAfter(chunks, err) => {
                    let items: Vec<Result<String, ChatError>> = chunks
                        .into_iter()
                        .map(|c| Ok(c.to_string()))
                        .chain(std::iter::once(Err(err)))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                Script::Reject(err) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeConnector, Script};
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use futures::StreamExt;

    fn client(connector: &Arc<FakeConnector>, store: MemoryCredentialStore, deploy: Option<&str>) -> SessionClient {
        SessionClient::new(
            Arc::new(connector.clone()),
            Arc::new(store),
            deploy.map(str::to_string),
            "gemini-test",
            "persona",
            ModelParams::default(),
        )
    }

    #[tokio::test]
    async fn missing_credential_everywhere_fails() {
        let connector = FakeConnector::with_scripts(vec![]);
        let mut sessions = client(&connector, MemoryCredentialStore::default(), None);
        let err = sessions.get_or_create_session().await.err().unwrap();
        assert!(matches!(err, ChatError::MissingCredential));
        assert!(!sessions.has_client());
    }

    #[tokio::test]
    async fn stored_override_wins_over_deploy_default() {
        let connector = FakeConnector::with_scripts(vec![]);
        let store = MemoryCredentialStore::with_key("AIzaStoredOverride12345");
        let mut sessions = client(&connector, store, Some("AIzaDeployDefault12345"));
        sessions.get_or_create_session().await.unwrap();
        assert_eq!(*connector.credentials.lock().unwrap(), ["AIzaStoredOverride12345"]);

        let connector = FakeConnector::with_scripts(vec![]);
        let mut sessions = client(&connector, MemoryCredentialStore::default(), Some("AIzaDeployDefault12345"));
        sessions.get_or_create_session().await.unwrap();
        assert_eq!(*connector.credentials.lock().unwrap(), ["AIzaDeployDefault12345"]);
    }

    #[tokio::test]
    async fn session_is_reused_and_carries_history() {
        let connector = FakeConnector::with_scripts(vec![Script::Chunks(vec!["[[VUI]] a"]), Script::Chunks(vec!["b"])]);
        let mut sessions = client(&connector, MemoryCredentialStore::with_key("AIzaKey1234567890123456"), None);

        let session = sessions.get_or_create_session().await.unwrap();
        let first_id = session.id;
        let reply: Vec<_> = session.send_streaming("một").await.unwrap().collect().await;
        assert_eq!(reply.len(), 1);
        session.record_exchange("một", "[[VUI]] a");

        let session = sessions.get_or_create_session().await.unwrap();
        assert_eq!(session.id, first_id);
        let _ = session.send_streaming("hai").await.unwrap();

        let requests = connector.requests.lock().unwrap();
        assert_eq!(requests[1].turns, vec![Turn::user("một"), Turn::model("[[VUI]] a"), Turn::user("hai")]);
        assert_eq!(requests[1].system_instruction, "persona");
        assert_eq!(requests[1].model, "gemini-test");
    }

    #[tokio::test]
    async fn initialize_replaces_client_and_drops_session() {
        let connector = FakeConnector::with_scripts(vec![]);
        let mut sessions = client(&connector, MemoryCredentialStore::with_key("AIzaKey1234567890123456"), None);
        let first = sessions.get_or_create_session().await.unwrap().id;

        sessions.initialize("  AIzaNewKey123456789012  ");
        assert!(!sessions.has_session());
        let second = sessions.get_or_create_session().await.unwrap().id;
        assert_ne!(first, second);
        assert_eq!(connector.credentials.lock().unwrap().last().unwrap(), "AIzaNewKey123456789012");

        sessions.initialize("   ");
        assert!(sessions.has_session());
    }

    #[tokio::test]
    async fn reset_recreates_eagerly_and_swallows_failure() {
        let connector = FakeConnector::with_scripts(vec![]);
        let mut sessions = client(&connector, MemoryCredentialStore::with_key("AIzaKey1234567890123456"), None);
        let first = sessions.get_or_create_session().await.unwrap().id;
        sessions.reset().await;
        assert!(sessions.has_session());
        assert_ne!(sessions.get_or_create_session().await.unwrap().id, first);

        let mut empty = client(&connector, MemoryCredentialStore::default(), None);
        empty.reset().await;
        assert!(!empty.has_session());
    }

    #[tokio::test]
    async fn discard_forgets_client() {
        let connector = FakeConnector::with_scripts(vec![]);
        let store = Arc::new(MemoryCredentialStore::with_key("AIzaKey1234567890123456"));
        let mut sessions = SessionClient::new(Arc::new(connector.clone()), store.clone(), None, "m", "p", ModelParams::default());
        sessions.get_or_create_session().await.unwrap();
        store.remove().await.unwrap();
        sessions.discard();
        assert!(!sessions.has_client());
        assert!(matches!(sessions.get_or_create_session().await.err(), Some(ChatError::MissingCredential)));
    }
}
