//! File system source: a directory tree of YAML files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::{mpsc, watch};
use walkdir::WalkDir;

use super::snapshot::FileSnapshot;
use super::{sleep_or_shutdown, ConfigFileChange, RetryPolicy, SourceDriver, SourceSink};
use crate::error::{Result, SyncError};

/// Default quiescence window before a changed file is read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches a directory tree and reports whole-file changes.
///
/// Filenames are `/` separated paths relative to the root. Hidden files and
/// anything below a hidden directory are ignored; an event under a hidden
/// path triggers a full rescan instead, which covers Kubernetes volume
/// mounts that swap a `..data` symlink. If the root itself disappears,
/// every known file is reported as removed.
pub struct FileSourceDriver {
    root: PathBuf,
    debounce: Duration,
    extensions: Vec<String>,
    retry: RetryPolicy,
    snapshot: FileSnapshot,
}

impl FileSourceDriver {
    /// Creates a driver for `root` watching `.yaml` and `.yml` files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
            extensions: vec!["yaml".to_string(), "yml".to_string()],
            retry: RetryPolicy::default(),
            snapshot: FileSnapshot::new(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-reads the whole tree and returns what changed since the last look.
    ///
    /// The walk runs on the blocking pool so that a large tree does not hold
    /// up the engine loop and other sources sharing the runtime.
    pub async fn resync(&mut self) -> Result<Vec<ConfigFileChange>> {
        let root = self.root.clone();
        let extensions = self.extensions.clone();
        let files = tokio::task::spawn_blocking(move || read_tree(&root, &extensions))
            .await
            .map_err(|e| SyncError::Runtime(format!("Directory scan failed: {}", e)))??;
        Ok(self.snapshot.replace_all(files))
    }

    /// Drops every known file, returning one removal per file.
    fn forget_all(&mut self) -> Vec<ConfigFileChange> {
        if !self.snapshot.is_empty() {
            log::warn!(
                "{} is gone, removing {} config files",
                self.root.display(),
                self.snapshot.len()
            );
        }
        self.snapshot.clear()
    }

    /// Turns one debounced path into zero or more file changes.
    async fn refresh_path(&mut self, path: &Path) -> Result<Vec<ConfigFileChange>> {
        if !self.root.is_dir() {
            return Ok(self.forget_all());
        }
        if is_hidden(&self.root, path) {
            return self.resync().await;
        }
        let Some(name) = relative_name(&self.root, path) else {
            return Ok(Vec::new());
        };

        if path.is_dir() {
            // A directory moved in: pick up everything below it.
            return self.resync().await;
        }

        if path.is_file() {
            if !has_config_extension(&self.extensions, path) {
                return Ok(Vec::new());
            }
            return match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(self.snapshot.observe(&name, Some(content)).into_iter().collect()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Ok(self.snapshot.observe(&name, None).into_iter().collect())
                }
                Err(e) => {
                    log::warn!("Failed to read {}: {}", path.display(), e);
                    Ok(Vec::new())
                }
            };
        }

        // Gone: either a tracked file or a whole directory.
        if self.snapshot.contains(&name) {
            Ok(self.snapshot.observe(&name, None).into_iter().collect())
        } else {
            Ok(self.snapshot.forget_prefix(&name))
        }
    }

    fn start_watcher(
        &self,
        raw_tx: mpsc::UnboundedSender<DebounceEventResult>,
    ) -> Result<Debouncer<RecommendedWatcher>> {
        let mut debouncer: Debouncer<RecommendedWatcher> =
            new_debouncer(self.debounce, move |result: DebounceEventResult| {
                let _ = raw_tx.send(result);
            })
            .map_err(|e| SyncError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::WatchError(e.to_string()))?;

        Ok(debouncer)
    }
}

/// Returns the relative, `/` separated name of `path`, if it lies under `root`.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|relative| {
            relative.components().any(|c| {
                c.as_os_str()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

fn has_config_extension(extensions: &[String], path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Reads every config file below `root`.
fn read_tree(root: &Path, extensions: &[String]) -> Result<BTreeMap<String, String>> {
    if !root.is_dir() {
        return Err(SyncError::ConfigDirNotFound(root.to_path_buf()));
    }

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || is_hidden(root, path) || !has_config_extension(extensions, path) {
            continue;
        }
        let Some(name) = relative_name(root, path) else {
            continue;
        };
        match std::fs::read_to_string(path) {
            Ok(content) => {
                files.insert(name, content);
            }
            Err(e) => {
                log::warn!("Skipping unreadable config file {}: {}", path.display(), e);
            }
        }
    }
    Ok(files)
}

#[async_trait]
impl SourceDriver for FileSourceDriver {
    fn name(&self) -> String {
        format!("file:{}", self.root.display())
    }

    async fn run(&mut self, sink: SourceSink, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Ok(canonical) = std::fs::canonicalize(&self.root) {
            self.root = canonical;
        }

        let initial = self.resync().await?;
        log::info!(
            "Loaded {} config files from {}",
            initial.len(),
            self.root.display()
        );
        if !sink.send_all(initial) {
            return Ok(());
        }

        let mut failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
            let _debouncer = match self.start_watcher(raw_tx) {
                Ok(debouncer) => debouncer,
                Err(e) => {
                    if !self.root.is_dir() && !sink.send_all(self.forget_all()) {
                        return Ok(());
                    }
                    failures = failures.saturating_add(1);
                    if failures > self.retry.max_retries {
                        return Err(SyncError::SourceExhausted {
                            source_name: self.name(),
                            attempts: failures,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.retry.delay_for(failures);
                    log::warn!(
                        "Failed to watch {} (attempt {}/{}), retrying in {:?}: {}",
                        self.root.display(),
                        failures,
                        self.retry.max_retries,
                        delay,
                        e
                    );
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            if failures > 0 {
                // Changes may have happened while nobody was watching.
                let changes = match self.resync().await {
                    Ok(changes) => changes,
                    Err(SyncError::ConfigDirNotFound(_)) => self.forget_all(),
                    Err(e) => {
                        log::warn!("Resync of {} failed: {}", self.root.display(), e);
                        Vec::new()
                    }
                };
                if !sink.send_all(changes) {
                    return Ok(());
                }
                failures = 0;
            }

            log::info!("Started watching config directory: {}", self.root.display());

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            log::info!("Stopped watching config directory");
                            return Ok(());
                        }
                    }
                    received = raw_rx.recv() => match received {
                        Some(Ok(events)) => {
                            for event in events {
                                let changes = self.refresh_path(&event.path).await?;
                                if !sink.send_all(changes) {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Err(e)) => {
                            log::error!("Watch error: {}", e);
                            failures = 1;
                            break;
                        }
                        None => {
                            failures = 1;
                            break;
                        }
                    }
                }
            }

            if sleep_or_shutdown(self.retry.delay_for(failures), &mut shutdown).await {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
