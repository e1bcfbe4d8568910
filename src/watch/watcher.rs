// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::watch::trigger::RunOnSaveTrigger;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Treat content modifications and file creation as saves. Editors that
/// save by writing a temp file and renaming it show up as `Create`.
fn is_save(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Watch `root` recursively and feed every saved path into `trigger`.
pub fn spawn_save_watcher(
    root: impl Into<PathBuf>,
    trigger: Arc<RunOnSaveTrigger>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    eprintln!("taskdeck: save watcher stopped; dropping notify event");
                }
            }
            Err(err) => eprintln!("taskdeck: file watch error: {err}"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("save watcher started on {:?}", root);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_save(&event.kind) {
                continue;
            }
            for path in &event.paths {
                let armed = trigger.on_file_saved(path);
                debug!(path = %path.display(), armed, "file saved");
            }
        }
        warn!("save watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    use super::*;

    #[test]
    fn only_content_changes_count_as_saves() {
        assert!(is_save(&EventKind::Create(CreateKind::File)));
        assert!(is_save(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_save(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
        assert!(!is_save(&EventKind::Remove(RemoveKind::File)));
    }
}
