//! File watching for automatic data reload.
//!
//! Watches the Excel file for modifications and invokes a reload
//! callback. Bursts of events from editors and sync tools are coalesced
//! into a single callback by waiting for the file to go quiet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Configuration for file watching.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet time required after the last event before reloading.
    pub settle_duration: Duration,
    /// Number of retry attempts for reload.
    pub retry_attempts: u32,
    /// Delay between retry attempts.
    pub retry_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            settle_duration: Duration::from_secs(2),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Errors that can occur during file watching.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    NotifyError(#[from] notify::Error),

    #[error("Watch path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

fn is_relevant(event: &Event, file_name: Option<&std::ffi::OsStr>, canonical: &Path) -> bool {
    let touches_file = event.paths.iter().any(|p| match file_name {
        Some(name) => p.file_name() == Some(name),
        None => p == canonical,
    });
    touches_file
        && matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        )
}

/// Starts watching a file for modifications.
///
/// Calls `on_change` once per burst of file events, after the file has
/// been quiet for `settle_duration`. The parent directory is watched
/// rather than the file itself so that atomic replaces are seen.
///
/// This function runs until an error occurs or the watcher is dropped.
pub async fn watch_file<F>(
    path: impl AsRef<Path>,
    config: WatcherConfig,
    on_change: F,
) -> Result<(), WatcherError>
where
    F: Fn() + Send + Sync + 'static,
{
    let path = path.as_ref();

    if !path.exists() {
        return Err(WatcherError::PathNotFound(path.to_path_buf()));
    }

    let canonical = path
        .canonicalize()
        .map_err(|_| WatcherError::PathNotFound(path.to_path_buf()))?;
    let watch_dir = canonical.parent().unwrap_or(&canonical).to_path_buf();
    let file_name = canonical.file_name().map(|s| s.to_owned());

    log::info!("Watching file: {}", canonical.display());
    log::debug!("Watch directory: {}", watch_dir.display());

    let (tx, mut rx) = mpsc::channel::<Event>(100);

    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                // Non-blocking send; a full channel just drops the event
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    loop {
        let event = rx.recv().await.ok_or(WatcherError::ChannelClosed)?;
        if !is_relevant(&event, file_name.as_deref(), &canonical) {
            continue;
        }
        log::debug!("File event: {:?}", event.kind);

        // Drain follow-up events until the file stays quiet.
        loop {
            match timeout(config.settle_duration, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return Err(WatcherError::ChannelClosed),
                Err(_) => break,
            }
        }

        log::info!("File changed, triggering reload");
        on_change();
    }
}
