//! Artifact persistence.

use std::path::{Path, PathBuf};

use mcpforge_core::{new_ulid, ForgeError, ForgeResult};

/// Persists generated text at a location derived from `(name, version)`.
///
/// Layout: `<root>/<name>/v<version>/mcp_server_<name>_v<version>.<ext>`.
/// Callers validate that `name` and `version` are single path components.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    extension: String,
}

/// Artifact body written next to its final location but not yet visible there.
#[derive(Debug)]
pub struct StagedArtifact {
    staged: PathBuf,
    target: PathBuf,
}

impl ArtifactWriter {
    /// Writer rooted at `root`, producing files with `extension`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Deterministic artifact path for `(name, version)`.
    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        self.root
            .join(name)
            .join(format!("v{version}"))
            .join(format!("mcp_server_{name}_v{version}.{}", self.extension))
    }

    /// Writes `text` straight to the derived path, overwriting any previous body.
    pub async fn write(&self, name: &str, version: &str, text: &str) -> ForgeResult<PathBuf> {
        let staged = self.stage(name, version, text).await?;
        staged.publish().await
    }

    /// Writes `text` to a temp file beside the derived path.
    ///
    /// The target is anchored at the canonical form of its directory, so the
    /// same artifact always reports the same path.
    pub async fn stage(&self, name: &str, version: &str, text: &str) -> ForgeResult<StagedArtifact> {
        let derived = self.path_for(name, version);
        let parent = derived.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_err(parent, e))?;
        let parent = tokio::fs::canonicalize(parent)
            .await
            .map_err(|e| write_err(parent, e))?;

        let file_name = derived
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = parent.join(&file_name);
        let staged = target.with_file_name(format!(".{file_name}.{}.staged", new_ulid()));
        tokio::fs::write(&staged, text)
            .await
            .map_err(|e| write_err(&staged, e))?;

        Ok(StagedArtifact { staged, target })
    }
}

impl StagedArtifact {
    /// Final path the artifact will be published to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically moves the staged body onto the final path.
    pub async fn publish(self) -> ForgeResult<PathBuf> {
        if let Err(e) = tokio::fs::rename(&self.staged, &self.target).await {
            let _ = tokio::fs::remove_file(&self.staged).await;
            return Err(write_err(&self.target, e));
        }
        Ok(self.target)
    }

    /// Drops the staged body; the final path is left untouched.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.staged).await {
            tracing::warn!(path = %self.staged.display(), error = %e, "failed to remove staged artifact");
        }
    }
}

/// `<artifact path>.log`
pub fn log_path(artifact: &Path) -> PathBuf {
    let mut s = artifact.as_os_str().to_owned();
    s.push(".log");
    PathBuf::from(s)
}

fn write_err(path: &Path, source: std::io::Error) -> ForgeError {
    ForgeError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_scoped_per_name_and_version() {
        let w = ArtifactWriter::new("/root", "py");
        assert_eq!(
            w.path_for("oracle", "1"),
            PathBuf::from("/root/oracle/v1/mcp_server_oracle_v1.py")
        );
        // Would collide if the identity were flattened into one file name.
        assert_ne!(w.path_for("a_v1", "2"), w.path_for("a", "1_v2"));
        assert_eq!(
            log_path(&w.path_for("oracle", "1")),
            PathBuf::from("/root/oracle/v1/mcp_server_oracle_v1.py.log")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn staged_target_is_canonical() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();
        let w = ArtifactWriter::new(dir.path().join("link"), "py");

        let path = w.write("oracle", "1", "x").await.unwrap();

        let expected = std::fs::canonicalize(&real)
            .unwrap()
            .join("oracle/v1/mcp_server_oracle_v1.py");
        assert_eq!(path, expected);
    }

    #[tokio::test]
    async fn write_creates_dirs_and_overwrites() {
        let dir = tempdir().unwrap();
        let w = ArtifactWriter::new(dir.path(), "py");

        let first = w.write("oracle", "1", "print('a')").await.unwrap();
        let second = w.write("oracle", "1", "print('b')").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "print('b')");
    }

    #[tokio::test]
    async fn discard_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let w = ArtifactWriter::new(dir.path(), "py");

        let staged = w.stage("oracle", "1", "x").await.unwrap();
        let target = staged.target().to_path_buf();
        staged.discard().await;

        assert!(!target.exists());
        let leftovers = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
