//! Folder watcher adapter: one non-recursive `notify` subscription at a time.
//!
//! `FolderWatch::subscribe` opens a watch on a single directory and returns a
//! channel of generation-tagged events. The collection owns the handle;
//! dropping it closes the watch (idempotent — notify tears down on drop).
//! Events raised by notify's callback thread are only mapped and tagged here;
//! all state mutation happens on the collection's owning thread when it
//! drains the channel.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::event::Flag;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot watch {dir}: {source}")]
    Subscribe {
        dir: PathBuf,
        source: notify::Error,
    },
}

/// Change events delivered to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    /// The watcher could not track all changes; everything must be rescanned.
    Overflow,
}

/// A watch event stamped with the collection generation that was current when
/// the subscription was opened. Stale generations are dropped at the pump.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: WatchEvent,
}

fn map_event(event: &notify::Event) -> Vec<WatchEvent> {
    if matches!(event.flag(), Some(Flag::Rescan)) {
        return vec![WatchEvent::Overflow];
    }
    let make: fn(PathBuf) -> WatchEvent = match event.kind {
        EventKind::Create(_) => WatchEvent::Created,
        EventKind::Modify(_) => WatchEvent::Modified,
        EventKind::Remove(_) => WatchEvent::Removed,
        _ => return Vec::new(),
    };
    event.paths.iter().cloned().map(make).collect()
}

/// Handle to the active folder subscription. Drop to stop delivery.
pub struct FolderWatch {
    // Held only for its Drop; notify unwatches when the watcher goes away.
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl FolderWatch {
    /// Begin asynchronous delivery of change events for exactly `dir`.
    ///
    /// Subscription failure (sandboxing, permissions, missing dir) is
    /// recoverable: the caller keeps operating on its loaded snapshot.
    pub fn subscribe(
        dir: &Path,
        generation: u64,
    ) -> Result<(Self, mpsc::Receiver<TaggedEvent>), WatchError> {
        let (tx, rx) = mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        for ev in map_event(&event) {
                            tx.send(TaggedEvent {
                                generation,
                                event: ev,
                            })
                            .ok();
                        }
                    }
                    Err(e) => {
                        eprintln!("watcher: error: {}", e);
                        // Errors mean events may have been lost.
                        tx.send(TaggedEvent {
                            generation,
                            event: WatchEvent::Overflow,
                        })
                        .ok();
                    }
                }
            })
            .map_err(|source| WatchError::Subscribe {
                dir: dir.to_path_buf(),
                source,
            })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                dir: dir.to_path_buf(),
                source,
            })?;

        eprintln!("watcher: watching {}", dir.display());
        Ok((
            FolderWatch {
                _watcher: watcher,
                dir: dir.to_path_buf(),
            },
            rx,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
