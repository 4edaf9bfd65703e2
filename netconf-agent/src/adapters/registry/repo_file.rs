use crate::domain::session::{AgentSession, SessionId, SessionSnapshot};
use crate::ports::SessionRegistry;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::error;

const TMP_SUFFIX: &str = ".tmp";

/// Publishes each live session as `<dir>/session-<id>.json` so monitoring
/// tools can read agent state without talking to the agent.
pub struct FileSessionRegistry {
    dir: PathBuf,
    inner: RwLock<HashMap<SessionId, AgentSession>>,
}

impl FileSessionRegistry {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating session state dir {}", dir.display()))?;
        Ok(Self {
            dir,
            inner: RwLock::new(HashMap::new()),
        })
    }

    pub fn snapshot_path(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("session-{id}.json"))
    }

    /// Reads back a published snapshot.
    pub fn load(path: &Path) -> anyhow::Result<SessionSnapshot> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading session snapshot {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing session snapshot {}", path.display()))
    }

    async fn persist(&self, session: &AgentSession) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(&session.to_snapshot())?;
        let path = self.snapshot_path(session.id());
        let tmp_path = path.with_extension(format!("json{TMP_SUFFIX}"));

        let mut file = fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("creating temp snapshot {}", tmp_path.display()))?;
        file.write_all(&json)
            .await
            .with_context(|| format!("writing temp snapshot {}", tmp_path.display()))?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("renaming snapshot to {}", path.display()))?;
        Ok(())
    }

    async fn store(&self, session: AgentSession) {
        let id = session.id();
        if let Err(err) = self.persist(&session).await {
            error!(session_id = %id, %err, "failed to persist session snapshot");
        }
        self.inner.write().await.insert(id, session);
    }
}

#[async_trait]
impl SessionRegistry for FileSessionRegistry {
    async fn insert(&self, session: AgentSession) {
        self.store(session).await;
    }

    async fn update(&self, session: AgentSession) {
        self.store(session).await;
    }

    async fn get(&self, id: SessionId) -> Option<AgentSession> {
        self.inner.read().await.get(&id).cloned()
    }

    async fn remove(&self, id: SessionId) {
        self.inner.write().await.remove(&id);
        let path = self.snapshot_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => error!(session_id = %id, %err, "failed to remove session snapshot"),
        }
    }
}
