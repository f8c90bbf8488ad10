use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Working directory shared by concurrent runs. Runs whose scratch files
/// can overlap are serialized through [`ScratchDir::lock`].
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Final path segment of a repository path, rejected when it could escape
/// the scratch directory.
pub fn bare_name(remote_path: &str) -> Result<&str> {
    let name = remote_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(remote_path)
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        bail!("cannot derive a file name from '{remote_path}'");
    }
    Ok(name)
}

/// Lock key covering every scratch file a run on `filename` touches:
/// `app.properties`, `app.json` and `app_patched.json` all map to `app`.
fn lock_key(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map_or_else(|| filename.to_string(), |s| s.to_string_lossy().into_owned());
    let mut key = stem.as_str();
    while let Some(base) = key.strip_suffix("_patched") {
        key = base;
    }
    key.to_string()
}

impl ScratchDir {
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating scratch directory {}", root.display()))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Hold the returned guard for the whole run on `filename`. Entries no
    /// run holds or waits on are pruned here.
    pub async fn lock(&self, filename: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(lock_key(filename)).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub async fn write(&self, filename: &str, content: &str) -> Result<PathBuf> {
        let name = bare_name(filename)?;
        let path = self.root.join(name);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "scratch file written");
        Ok(path)
    }
}
