//! Durable, append-only list of generated artifacts.

use std::path::{Path, PathBuf};

use mcpforge_core::model::RegistryEntry;
use mcpforge_core::{new_ulid, ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// On-disk layout of the registry document.
///
/// Older documents keep the list under `mcp_registry`; they are read as-is and
/// rewritten under `registry` on the next write. A document with neither key is
/// corrupt, not empty.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(alias = "mcp_registry")]
    registry: Vec<RegistryEntry>,
}

/// Append-only registry backed by one JSON document.
///
/// Every access loads the whole document and every write rewrites it.
/// Writers are serialized by `lock`; readers share it. The lock covers only the
/// read-modify-write itself.
pub struct JsonRegistry {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonRegistry {
    /// Opens the registry at `path`, creating an empty document if none exists.
    pub async fn open(path: impl Into<PathBuf>) -> ForgeResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| registry_io("create registry dir", parent, e))?;
        }

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| registry_io("stat registry", &path, e))?;
        if !exists {
            write_doc(&path, &RegistryDoc::default()).await?;
            tracing::info!(path = %path.display(), "created empty registry");
        }

        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    /// Appends `entry`. No deduplication: the same id may appear many times.
    pub async fn append(&self, entry: RegistryEntry) -> ForgeResult<()> {
        let _guard = self.lock.write().await;
        let mut doc = read_doc(&self.path).await?;
        tracing::debug!(id = %entry.id, existing = doc.registry.len(), "appending registry entry");
        doc.registry.push(entry);
        write_doc(&self.path, &doc).await
    }

    /// All entries in append order.
    pub async fn list_all(&self) -> ForgeResult<Vec<RegistryEntry>> {
        let _guard = self.lock.read().await;
        Ok(read_doc(&self.path).await?.registry)
    }

    /// Sets `deployed` on every entry whose artifact is `path`.
    ///
    /// Returns how many entries changed.
    pub async fn set_deployed(&self, path: &str, deployed: bool) -> ForgeResult<usize> {
        let _guard = self.lock.write().await;
        let mut doc = read_doc(&self.path).await?;
        let mut changed = 0;
        for entry in doc.registry.iter_mut().filter(|e| e.path == path) {
            if entry.deployed != deployed {
                entry.deployed = deployed;
                changed += 1;
            }
        }
        if changed > 0 {
            write_doc(&self.path, &doc).await?;
        }
        Ok(changed)
    }
}

async fn read_doc(path: &Path) -> ForgeResult<RegistryDoc> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| registry_io("read registry", path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ForgeError::Registry(format!("corrupt registry {}: {e}", path.display()))
    })
}

/// Rewrites the document through a sibling temp file so readers never see a
/// partially written registry.
async fn write_doc(path: &Path, doc: &RegistryDoc) -> ForgeResult<()> {
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension(format!("json.{}.tmp", new_ulid()));
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| registry_io("write registry", &tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(registry_io("replace registry", path, e));
    }
    Ok(())
}

fn registry_io(what: &str, path: &Path, e: std::io::Error) -> ForgeError {
    ForgeError::Registry(format!("{what} {}: {e}", path.display()))
}
