// # File State Store
//
// File-based implementation of StateStore.
//
// ## Purpose
//
// Persists the last reconciled address across daemon restarts so a restart
// with an unchanged address costs no remote update.
//
// ## Durability
//
// - Atomic writes: new content goes to a temporary file, is synced, then
//   renamed over the state file
// - Directory creation: the parent directory is created on construction
// - Corruption: unparseable content is reported by `load()`; the next
//   successful reconciliation overwrites it
//
// ## File Format
//
// Plain text, one address, trailing newline optional:
//
// ```text
// 1.2.3.4
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::state_store::StateStore;

/// File-based state store
///
/// # Example
///
/// ```rust,no_run
/// use allowsync_core::state::FileStateStore;
/// use allowsync_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/allowsync/ip.txt").await?;
///
///     store.save("1.2.3.4".parse()?).await?;
///
///     let ip = store.load().await?;
///     assert_eq!(ip, Some("1.2.3.4".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a file state store, creating parent directories if needed
    ///
    /// Failing to create the directory is a configuration error: no cycle
    /// could ever persist its result.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if path.is_dir() {
            return Err(Error::config(format!(
                "State path is a directory: {}",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<IpAddr>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file does not exist: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::state_store(format!(
                    "Failed to read state file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        content.parse().map(Some).map_err(|_| {
            Error::state_store(format!(
                "State file {} does not hold an IP address: {:?}",
                self.path.display(),
                content
            ))
        })
    }

    async fn save(&self, ip: IpAddr) -> Result<(), Error> {
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(format!("{}\n", ip).as_bytes())
                .await
                .map_err(|e| {
                    Error::state_store(format!(
                        "Failed to write to temp file {}: {}",
                        temp_path.display(),
                        e
                    ))
                })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }
}
