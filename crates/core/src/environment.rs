//! Execution environments
//!
//! An [`ExecutionEnvironment`] is selected once, when the orchestrator is built,
//! and decides where notifications go, how caches are invalidated and how
//! pending batch work is drained. It never changes which steps run.
//!
//! - [`Interactive`]: a person is watching. Messages are written to a writer
//!   (stdout in the CLI), there is no alias, caches are flushed in-process.
//! - [`Unattended`]: scripted runs identified by an alias. Messages go to
//!   stderr and the log, cache rebuilds may be delegated to a configured command.
//!
//! Notifications are written directly, never through the log filter, so
//! lowering the log level cannot hide a failed step.

use crate::batch::BatchQueue;
use crate::manifest::ScenarioManifest;
use crate::shell::{run_logged, shell_command};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Alias used by unattended runs that were not given one
pub const DEFAULT_ALIAS: &str = "@self";

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NotificationKind {
    Status,
    Error,
}

impl NotificationKind {
    fn prefix(&self) -> &'static str {
        match self {
            NotificationKind::Status => "status",
            NotificationKind::Error => "error",
        }
    }
}

/// Notification, cache and batch backend for one orchestrator
pub trait ExecutionEnvironment: Send + Sync {
    /// Execution alias, `None` for interactive contexts
    fn resolve_alias(&self) -> Option<String>;

    fn notify_status(&self, message: &str);

    fn notify_error(&self, message: &str);

    /// Invalidate caches after a scenario changed site state
    fn invalidate_cache(&self, alias: Option<&str>);

    /// Synchronously run any batch work queued by earlier operations
    fn drain_pending_batch_work(&self, alias: Option<&str>);
}

/// Cache targets shared by both environments
#[derive(Debug, Clone, Default)]
pub struct CacheTargets {
    /// Directories whose contents are removed on flush
    pub paths: Vec<PathBuf>,
    /// Command used by unattended runs instead of flushing
    pub rebuild_command: Option<String>,
    /// Working directory for the rebuild command
    pub working_dir: PathBuf,
}

impl CacheTargets {
    pub fn from_manifest(manifest: &ScenarioManifest) -> Self {
        Self {
            paths: manifest.cache_paths(),
            rebuild_command: manifest.cache.rebuild_command.clone(),
            working_dir: manifest.base_dir.clone(),
        }
    }

    /// Remove the contents of every cache directory, returning the number of entries removed
    pub fn flush_all(&self) -> Result<usize> {
        let mut removed = 0;
        for dir in &self.paths {
            removed += flush_dir(dir)?;
        }
        Ok(removed)
    }

    /// Run the rebuild command for `alias`
    fn rebuild(&self, script: &str, alias: &str) -> Result<()> {
        let mut command = shell_command(script);
        if !self.working_dir.as_os_str().is_empty() {
            command.current_dir(&self.working_dir);
        }
        command.env("SCENARIOS_ALIAS", alias);

        let output = run_logged(command, "cache-rebuild")
            .with_context(|| format!("Failed to run cache rebuild command: {}", script))?;
        if !output.status.success() {
            anyhow::bail!(
                "cache rebuild command exited with code {}",
                output.status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}

fn flush_dir(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        debug!("Cache directory {} does not exist, skipping", dir.display());
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read cache directory {}", dir.display()))?
    {
        let path = entry?.path();
        let removal = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removal.with_context(|| format!("Failed to remove cache entry {}", path.display()))?;
        removed += 1;
    }
    debug!("Flushed {} entries from {}", removed, dir.display());
    Ok(removed)
}

/// Line-oriented sink for user-facing notifications
///
/// Notifications are never routed through the log filter.
struct NotificationWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl NotificationWriter {
    fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, kind: NotificationKind, message: &str) {
        let mut writer = self.lock();
        if let Err(e) =
            writeln!(writer, "{}: {}", kind.prefix(), message).and_then(|_| writer.flush())
        {
            warn!("Failed to write notification: {}", e);
        }
    }
}

/// Environment for a person watching the run
pub struct Interactive {
    output: NotificationWriter,
    cache: CacheTargets,
    queue: BatchQueue,
}

impl Interactive {
    pub fn new(writer: Box<dyn Write + Send>, cache: CacheTargets, queue: BatchQueue) -> Self {
        Self {
            output: NotificationWriter::new(writer),
            cache,
            queue,
        }
    }

    /// Interactive environment writing to stdout
    pub fn stdout(cache: CacheTargets, queue: BatchQueue) -> Self {
        Self::new(Box::new(std::io::stdout()), cache, queue)
    }
}

impl ExecutionEnvironment for Interactive {
    fn resolve_alias(&self) -> Option<String> {
        None
    }

    fn notify_status(&self, message: &str) {
        debug!("status: {}", message);
        self.output.emit(NotificationKind::Status, message);
    }

    fn notify_error(&self, message: &str) {
        debug!("error: {}", message);
        self.output.emit(NotificationKind::Error, message);
    }

    fn invalidate_cache(&self, _alias: Option<&str>) {
        match self.cache.flush_all() {
            Ok(removed) => debug!("Flushed all caches ({} entries)", removed),
            Err(e) => self.notify_error(&format!("Cache flush failed: {:#}", e)),
        }
    }

    fn drain_pending_batch_work(&self, _alias: Option<&str>) {
        if self.queue.is_empty() {
            return;
        }
        self.queue.drain(|label, result| match result {
            Ok(()) => self.notify_status(&format!("Processed batch job {}.", label)),
            Err(e) => self.notify_error(&format!("Batch job {} failed: {:#}", label, e)),
        });
    }
}

/// Environment for scripted runs identified by an alias
///
/// Notifications go to stderr, independent of the log level, and are also
/// recorded as tracing events carrying the alias.
pub struct Unattended {
    alias: String,
    output: NotificationWriter,
    cache: CacheTargets,
    queue: BatchQueue,
}

impl Unattended {
    /// `alias` defaults to [`DEFAULT_ALIAS`] when empty or absent
    pub fn new(alias: Option<String>, cache: CacheTargets, queue: BatchQueue) -> Self {
        let alias = alias
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ALIAS.to_string());
        Self {
            alias,
            output: NotificationWriter::new(Box::new(std::io::stderr())),
            cache,
            queue,
        }
    }

    /// Send notifications to `writer` instead of stderr
    pub fn with_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.output = NotificationWriter::new(writer);
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl ExecutionEnvironment for Unattended {
    fn resolve_alias(&self) -> Option<String> {
        Some(self.alias.clone())
    }

    fn notify_status(&self, message: &str) {
        debug!(alias = %self.alias, status = "ok", "{}", message);
        self.output.emit(NotificationKind::Status, message);
    }

    fn notify_error(&self, message: &str) {
        error!(alias = %self.alias, "{}", message);
        self.output.emit(NotificationKind::Error, message);
    }

    fn invalidate_cache(&self, alias: Option<&str>) {
        let alias = alias.unwrap_or(&self.alias);
        let result = match &self.cache.rebuild_command {
            Some(script) => {
                info!(alias = %alias, "Rebuilding caches via command");
                self.cache.rebuild(script, alias)
            }
            None => self.cache.flush_all().map(|removed| {
                debug!(alias = %alias, "Flushed all caches ({} entries)", removed);
            }),
        };
        if let Err(e) = result {
            self.notify_error(&format!("Cache rebuild failed: {:#}", e));
        }
    }

    fn drain_pending_batch_work(&self, alias: Option<&str>) {
        if self.queue.is_empty() {
            return;
        }
        let alias = alias.unwrap_or(&self.alias).to_string();
        info!(alias = %alias, pending = self.queue.len(), "Processing pending batch work");
        let summary = self.queue.drain(|label, result| match result {
            Ok(()) => debug!(alias = %alias, "Batch job {} completed", label),
            Err(e) => self.notify_error(&format!("Batch job {} failed: {:#}", label, e)),
        });
        info!(
            alias = %alias,
            processed = summary.processed,
            failed = summary.failed,
            "Batch work drained"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchJob;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn unattended_with_buffer(
        alias: Option<&str>,
        cache: CacheTargets,
        queue: BatchQueue,
    ) -> (Unattended, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let env = Unattended::new(alias.map(str::to_string), cache, queue)
            .with_writer(Box::new(buffer.clone()));
        (env, buffer)
    }

    #[test]
    fn test_interactive_writes_prefixed_messages() {
        let buffer = SharedBuffer::default();
        let env = Interactive::new(
            Box::new(buffer.clone()),
            CacheTargets::default(),
            BatchQueue::new(),
        );

        assert_eq!(env.resolve_alias(), None);
        env.notify_status("Enabling the Demo scenario.");
        env.notify_error("The scenario nope does not exist.");

        assert_eq!(
            buffer.contents(),
            "status: Enabling the Demo scenario.\nerror: The scenario nope does not exist.\n"
        );
    }

    #[test]
    fn test_unattended_writes_messages_regardless_of_log_level() {
        // No subscriber is installed here, so tracing drops every event.
        let (env, buffer) =
            unattended_with_buffer(Some("@stage"), CacheTargets::default(), BatchQueue::new());

        env.notify_status("Enabling the Demo scenario.");
        env.notify_error("Migration \"Users\" failed to execute import");

        assert_eq!(
            buffer.contents(),
            "status: Enabling the Demo scenario.\nerror: Migration \"Users\" failed to execute import\n"
        );
    }

    #[test]
    fn test_unattended_alias_defaults() {
        let env = Unattended::new(None, CacheTargets::default(), BatchQueue::new());
        assert_eq!(env.resolve_alias().as_deref(), Some(DEFAULT_ALIAS));

        let env = Unattended::new(Some("  ".into()), CacheTargets::default(), BatchQueue::new());
        assert_eq!(env.alias(), DEFAULT_ALIAS);

        let env = Unattended::new(Some("@prod".into()), CacheTargets::default(), BatchQueue::new());
        assert_eq!(env.resolve_alias().as_deref(), Some("@prod"));
    }

    #[test]
    fn test_flush_all_removes_contents_but_keeps_directory() {
        let tmp = TempDir::new().unwrap();
        let cache_dir = tmp.path().join("cache");
        std::fs::create_dir_all(cache_dir.join("nested")).unwrap();
        std::fs::write(cache_dir.join("a.bin"), "x").unwrap();
        std::fs::write(cache_dir.join("nested/b.bin"), "y").unwrap();

        let targets = CacheTargets {
            paths: vec![cache_dir.clone(), tmp.path().join("missing")],
            ..Default::default()
        };
        assert_eq!(targets.flush_all().unwrap(), 2);
        assert!(cache_dir.is_dir());
        assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_interactive_drain_reports_each_job() {
        let queue = BatchQueue::new();
        queue.enqueue(BatchJob::new("warm", || Ok(())));
        queue.enqueue(BatchJob::new("broken", || anyhow::bail!("nope")));

        let buffer = SharedBuffer::default();
        let env = Interactive::new(Box::new(buffer.clone()), CacheTargets::default(), queue.clone());
        env.drain_pending_batch_work(None);

        assert!(queue.is_empty());
        assert_eq!(
            buffer.contents(),
            "status: Processed batch job warm.\nerror: Batch job broken failed: nope\n"
        );
    }

    #[test]
    fn test_unattended_drain_only_notifies_failures() {
        let queue = BatchQueue::new();
        queue.enqueue(BatchJob::new("warm", || Ok(())));
        let (env, buffer) = unattended_with_buffer(None, CacheTargets::default(), queue.clone());
        env.drain_pending_batch_work(Some("@self"));
        assert!(queue.is_empty());
        assert!(buffer.contents().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unattended_cache_rebuild_command_receives_alias() {
        let tmp = TempDir::new().unwrap();
        let targets = CacheTargets {
            paths: Vec::new(),
            rebuild_command: Some("echo \"$SCENARIOS_ALIAS\" > rebuilt.txt".into()),
            working_dir: tmp.path().to_path_buf(),
        };
        let (env, buffer) = unattended_with_buffer(Some("@stage"), targets, BatchQueue::new());
        env.invalidate_cache(env.resolve_alias().as_deref());

        let written = std::fs::read_to_string(tmp.path().join("rebuilt.txt")).unwrap();
        assert_eq!(written.trim(), "@stage");
        assert!(buffer.contents().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_cache_rebuild_is_reported() {
        let tmp = TempDir::new().unwrap();
        let targets = CacheTargets {
            paths: Vec::new(),
            rebuild_command: Some("exit 5".into()),
            working_dir: tmp.path().to_path_buf(),
        };
        let (env, buffer) = unattended_with_buffer(None, targets, BatchQueue::new());
        env.invalidate_cache(None);

        let contents = buffer.contents();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("error: Cache rebuild failed"));
        assert!(contents.contains("exited with code 5"));
    }
}
