//! Session registry
//!
//! Process-wide session state and build orchestration. All descriptor reads
//! and writes, including mutation from a finishing build task, go through a
//! single lock. Builds run on background tasks capped by a semaphore; the
//! task itself never propagates an error, it records the outcome on the
//! descriptor instead.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::builder::SessionMaterializer;
use super::types::{
    ConversationTurn, SessionDescriptor, SessionError, SessionRequest, SessionStatus,
};
use crate::core::constants::{MAX_CONCURRENT_BUILDS, SESSION_ID_LEN};
use crate::data::types::SessionManifest;

/// Tracks session descriptors and drives builds asynchronously
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionDescriptor>>>,
    builds: Mutex<HashMap<String, JoinHandle<()>>>,
    materializer: Arc<dyn SessionMaterializer>,
    build_permits: Arc<Semaphore>,
}

impl SessionRegistry {
    pub fn new(materializer: Arc<dyn SessionMaterializer>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            builds: Mutex::new(HashMap::new()),
            materializer,
            build_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_BUILDS)),
        }
    }

    /// Allocate a session, record it as `building`, and schedule the build.
    /// Returns the descriptor immediately.
    pub fn create(&self, request: SessionRequest, owner: &str) -> SessionDescriptor {
        let id = Uuid::new_v4().simple().to_string()[..SESSION_ID_LEN].to_string();

        let descriptor = SessionDescriptor {
            id: id.clone(),
            owner: owner.to_string(),
            status: SessionStatus::Building,
            services: request.services.clone(),
            signal_types: request.signal_types.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            created_at: Utc::now(),
            counts: Default::default(),
            manifest: None,
            error: None,
            conversation: Vec::new(),
        };

        self.sessions.lock().insert(id.clone(), descriptor.clone());

        let handle = tokio::spawn(run_build(
            Arc::clone(&self.sessions),
            Arc::clone(&self.materializer),
            Arc::clone(&self.build_permits),
            id.clone(),
            request,
        ));
        self.builds.lock().insert(id, handle);

        descriptor
    }

    /// All sessions owned by `owner`, oldest first
    pub fn list(&self, owner: &str) -> Vec<SessionDescriptor> {
        let mut sessions: Vec<SessionDescriptor> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Descriptor lookup. Foreign sessions are indistinguishable from
    /// missing ones.
    pub fn get(&self, id: &str, owner: &str) -> Result<SessionDescriptor, SessionError> {
        self.sessions
            .lock()
            .get(id)
            .filter(|s| s.owner == owner)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    /// Manifest of a ready session
    pub fn manifest(&self, id: &str, owner: &str) -> Result<SessionManifest, SessionError> {
        let descriptor = self.get(id, owner)?;
        match descriptor.status {
            SessionStatus::Ready => Ok(descriptor.manifest.unwrap_or_default()),
            status => Err(SessionError::NotReady { status }),
        }
    }

    /// Append a conversation turn to a session
    pub fn append_conversation(
        &self,
        id: &str,
        owner: &str,
        turn: ConversationTurn,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(id)
            .filter(|s| s.owner == owner)
            .ok_or(SessionError::NotFound)?;
        session.conversation.push(turn);
        Ok(())
    }

    /// Tear down a session's materialization and remove the descriptor.
    /// A session still `building` is deleted safely: the in-flight build is
    /// awaited before teardown.
    pub async fn delete(&self, id: &str, owner: &str) -> Result<(), SessionError> {
        if self
            .sessions
            .lock()
            .get(id)
            .filter(|s| s.owner == owner)
            .is_none()
        {
            return Err(SessionError::NotFound);
        }

        let handle = self.builds.lock().remove(id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.materializer.teardown(id).await?;
        self.sessions.lock().remove(id);
        Ok(())
    }
}

/// Background build: run the materializer and record the outcome on the
/// descriptor. Never propagates an error out of the task.
async fn run_build(
    sessions: Arc<Mutex<HashMap<String, SessionDescriptor>>>,
    materializer: Arc<dyn SessionMaterializer>,
    permits: Arc<Semaphore>,
    id: String,
    request: SessionRequest,
) {
    // Closed only on shutdown; treat as cancellation
    let Ok(_permit) = permits.acquire().await else {
        return;
    };

    let result = materializer.build(&id, &request).await;

    let mut sessions = sessions.lock();
    // The session may have been deleted mid-build; nothing to record then
    let Some(session) = sessions.get_mut(&id) else {
        return;
    };

    match result {
        Ok(output) => {
            session.status = SessionStatus::Ready;
            session.counts = output.counts;
            session.manifest = Some(output.manifest);
            tracing::info!(session_id = %id, counts = ?session.counts, "Session ready");
        }
        Err(e) => {
            session.status = SessionStatus::Error;
            session.error = Some(e.to_string());
            tracing::error!(session_id = %id, error = %e, "Session build failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::TableManifest;
    use crate::domain::session::types::{BuildOutput, SignalType};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct StubMaterializer {
        fail: bool,
        build_delay: Duration,
        torn_down: Mutex<Vec<String>>,
    }

    impl StubMaterializer {
        fn new() -> Self {
            Self {
                fail: false,
                build_delay: Duration::ZERO,
                torn_down: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl SessionMaterializer for StubMaterializer {
        async fn build(
            &self,
            _session_id: &str,
            _request: &SessionRequest,
        ) -> Result<BuildOutput, SessionError> {
            tokio::time::sleep(self.build_delay).await;
            if self.fail {
                return Err(SessionError::BuildFailed("disk full".to_string()));
            }
            let mut counts = BTreeMap::new();
            counts.insert("traces".to_string(), 50);
            let mut manifest = SessionManifest::new();
            manifest.insert(
                "traces".to_string(),
                TableManifest {
                    row_count: 50,
                    columns: vec![],
                    sample_rows: vec![],
                },
            );
            Ok(BuildOutput { counts, manifest })
        }

        async fn teardown(&self, session_id: &str) -> Result<(), SessionError> {
            self.torn_down.lock().push(session_id.to_string());
            Ok(())
        }

        async fn list_services(&self) -> Result<Vec<String>, SessionError> {
            Ok(vec!["auth-service".to_string()])
        }
    }

    fn make_request() -> SessionRequest {
        SessionRequest {
            services: vec!["auth-service".to_string()],
            signal_types: vec![SignalType::Traces],
            start_time: Utc::now() - chrono::Duration::hours(1),
            end_time: Utc::now(),
        }
    }

    async fn wait_for_status(
        registry: &SessionRegistry,
        id: &str,
        owner: &str,
        status: SessionStatus,
    ) -> SessionDescriptor {
        for _ in 0..100 {
            let descriptor = registry.get(id, owner).unwrap();
            if descriptor.status == status {
                return descriptor;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {:?}", id, status);
    }

    #[tokio::test]
    async fn test_create_returns_building_with_hex_id() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        let descriptor = registry.create(make_request(), "alice");

        assert_eq!(descriptor.status, SessionStatus::Building);
        assert_eq!(descriptor.id.len(), 12);
        assert!(descriptor.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(descriptor.manifest.is_none());
    }

    #[tokio::test]
    async fn test_build_success_transitions_to_ready() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        let descriptor = registry.create(make_request(), "alice");

        let ready = wait_for_status(&registry, &descriptor.id, "alice", SessionStatus::Ready).await;
        assert_eq!(ready.counts["traces"], 50);
        assert!(ready.manifest.is_some());
        assert!(ready.error.is_none());
    }

    #[tokio::test]
    async fn test_build_failure_transitions_to_error() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::failing()));
        let descriptor = registry.create(make_request(), "alice");

        let failed =
            wait_for_status(&registry, &descriptor.id, "alice", SessionStatus::Error).await;
        assert!(failed.error.unwrap().contains("disk full"));
        assert!(failed.manifest.is_none());
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        let descriptor = registry.create(make_request(), "alice");

        assert!(registry.get(&descriptor.id, "alice").is_ok());
        assert!(matches!(
            registry.get(&descriptor.id, "mallory"),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        registry.create(make_request(), "alice");
        registry.create(make_request(), "alice");
        registry.create(make_request(), "bob");

        assert_eq!(registry.list("alice").len(), 2);
        assert_eq!(registry.list("bob").len(), 1);
        assert!(registry.list("mallory").is_empty());
    }

    #[tokio::test]
    async fn test_delete_tears_down_and_removes() {
        let stub = Arc::new(StubMaterializer::new());
        let registry = SessionRegistry::new(stub.clone());
        let descriptor = registry.create(make_request(), "alice");
        wait_for_status(&registry, &descriptor.id, "alice", SessionStatus::Ready).await;

        registry.delete(&descriptor.id, "alice").await.unwrap();
        assert_eq!(stub.torn_down.lock().as_slice(), &[descriptor.id.clone()]);
        assert!(matches!(
            registry.get(&descriptor.id, "alice"),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_while_building_waits_for_build() {
        let stub = Arc::new(StubMaterializer {
            build_delay: Duration::from_millis(100),
            ..StubMaterializer::new()
        });
        let registry = SessionRegistry::new(stub.clone());
        let descriptor = registry.create(make_request(), "alice");

        // Delete immediately; must await the in-flight build before teardown
        registry.delete(&descriptor.id, "alice").await.unwrap();
        assert_eq!(stub.torn_down.lock().len(), 1);
        assert!(matches!(
            registry.get(&descriptor.id, "alice"),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_error_session() {
        let stub = Arc::new(StubMaterializer::failing());
        let registry = SessionRegistry::new(stub.clone());
        let descriptor = registry.create(make_request(), "alice");
        wait_for_status(&registry, &descriptor.id, "alice", SessionStatus::Error).await;

        registry.delete(&descriptor.id, "alice").await.unwrap();
        assert!(matches!(
            registry.get(&descriptor.id, "alice"),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_session() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        assert!(matches!(
            registry.delete("000000000000", "alice").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_manifest_not_ready_while_building() {
        let stub = Arc::new(StubMaterializer {
            build_delay: Duration::from_millis(200),
            ..StubMaterializer::new()
        });
        let registry = SessionRegistry::new(stub);
        let descriptor = registry.create(make_request(), "alice");

        assert!(matches!(
            registry.manifest(&descriptor.id, "alice"),
            Err(SessionError::NotReady {
                status: SessionStatus::Building
            })
        ));
    }

    #[tokio::test]
    async fn test_conversation_append() {
        let registry = SessionRegistry::new(Arc::new(StubMaterializer::new()));
        let descriptor = registry.create(make_request(), "alice");

        registry
            .append_conversation(
                &descriptor.id,
                "alice",
                ConversationTurn {
                    role: "user".to_string(),
                    content: "which service is slowest?".to_string(),
                },
            )
            .unwrap();

        let fetched = registry.get(&descriptor.id, "alice").unwrap();
        assert_eq!(fetched.conversation.len(), 1);
        assert!(matches!(
            registry.append_conversation(
                &descriptor.id,
                "mallory",
                ConversationTurn {
                    role: "user".to_string(),
                    content: "let me in".to_string(),
                },
            ),
            Err(SessionError::NotFound)
        ));
    }
}
