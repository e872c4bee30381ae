//! Recursive, concurrent discovery of script files.
//!
//! Every directory listing and every file read runs in its own task and holds
//! its own barrier unit. Results are streamed to the orchestrator; a failing
//! entry is reported and its siblings carry on.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::loader::barrier::BarrierUnit;

/// A script file read from disk.
#[derive(Debug, Clone)]
pub struct ScannedScript {
    /// File path
    pub path: PathBuf,
    /// Name input: file stem, or root-relative path without extension
    pub stem: String,
    /// Full text
    pub source: String,
}

/// Scanner output. Each event owns the unit of work it completes.
pub enum ScanEvent {
    Found { script: ScannedScript, unit: BarrierUnit },
    Failed { error: Error, unit: BarrierUnit },
}

pub type ScanSender = mpsc::UnboundedSender<ScanEvent>;

/// Lists script roots recursively and reads matching files.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    extension: String,
    namespace: bool,
}

impl DirectoryScanner {
    pub fn new(extension: impl Into<String>, namespace: bool) -> Self {
        Self {
            extension: extension.into(),
            namespace,
        }
    }

    /// Spawn a scan of every root. Each root takes a unit split off `parent`.
    pub fn scan(&self, roots: &[PathBuf], parent: &BarrierUnit, tx: &ScanSender) {
        for root in roots {
            log::debug!("[scan] listing root: {}", root.display());
            let task = self
                .clone()
                .scan_dir(root.clone(), root.clone(), parent.enqueue(), tx.clone());
            tokio::spawn(task);
        }
    }

    /// Whether a path carries the recognised extension.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Name input for a file under `root`.
    pub fn stem_for(&self, root: &Path, path: &Path) -> Option<String> {
        if !self.namespace {
            return path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }

        let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
        let parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    fn scan_dir(
        self,
        root: PathBuf,
        dir: PathBuf,
        unit: BarrierUnit,
        tx: ScanSender,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(source) => {
                    let error = Error::Discovery { path: dir, source };
                    let _ = tx.send(ScanEvent::Failed { error, unit });
                    return;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(source) => {
                        let error = Error::Discovery {
                            path: dir.clone(),
                            source,
                        };
                        let _ = tx.send(ScanEvent::Failed {
                            error,
                            unit: unit.enqueue(),
                        });
                        break;
                    }
                };

                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(source) => {
                        let error = Error::Discovery { path, source };
                        let _ = tx.send(ScanEvent::Failed {
                            error,
                            unit: unit.enqueue(),
                        });
                        continue;
                    }
                };

                if file_type.is_dir() {
                    let task =
                        self.clone()
                            .scan_dir(root.clone(), path, unit.enqueue(), tx.clone());
                    tokio::spawn(task);
                } else if self.matches(&path) {
                    // Symlinked files are read through; symlinked directories are not descended.
                    if file_type.is_symlink() && !is_file(&path).await {
                        continue;
                    }
                    log::debug!("[scan] found file: {}", path.display());
                    let task = self
                        .clone()
                        .read_script(root.clone(), path, unit.enqueue(), tx.clone());
                    tokio::spawn(task);
                }
            }
        })
    }

    async fn read_script(self, root: PathBuf, path: PathBuf, unit: BarrierUnit, tx: ScanSender) {
        let event = match tokio::fs::read_to_string(&path).await {
            Ok(source) => match self.stem_for(&root, &path) {
                Some(stem) => ScanEvent::Found {
                    script: ScannedScript { path, stem, source },
                    unit,
                },
                None => return,
            },
            Err(source) => ScanEvent::Failed {
                error: Error::Discovery { path, source },
                unit,
            },
        };
        let _ = tx.send(event);
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
