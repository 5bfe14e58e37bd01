//! The image collection: ordered entry set, cursor, and live folder sync.
//!
//! All mutation happens on the owning thread. Watcher events arrive on
//! notify's callback thread, get tagged and queued (see `watcher`), and are
//! applied here when the owner calls `pump_events` — so every state change
//! is linearized regardless of which thread raised the event. A generation
//! counter bumped on every `set_folder` shields the collection from stale
//! events of a subscription it already replaced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::entry::ImageEntry;
use crate::prefetch::{PayloadCache, SharedView};
use crate::scanner;
use crate::watcher::{FolderWatch, TaggedEvent, WatchEvent};

pub const APP_TITLE: &str = "wiv";

/// Narrow interface to the UI collaborator. The collection never holds a
/// full UI reference; it only pushes these three signals.
pub trait EventSink {
    /// The cursor moved (or cleared). Carries the newly current entry.
    fn current_changed(&self, entry: Option<&ImageEntry>);
    /// The entry set changed (scan, rescan, removal).
    fn collection_changed(&self);
    /// User-visible toast. Rate limiting is the presenter's concern; the
    /// collection emits unconditionally.
    fn notify(&self, text: &str, title: &str);
}

pub struct ImageCollection {
    entries: Vec<ImageEntry>,
    current: Option<usize>,
    folder: Option<PathBuf>,
    generation: u64,
    watch: Option<FolderWatch>,
    events: Option<Receiver<TaggedEvent>>,
    sink: Box<dyn EventSink>,
    cache: Arc<PayloadCache>,
    view: Arc<SharedView>,
}

impl ImageCollection {
    pub fn new(sink: Box<dyn EventSink>, cache: Arc<PayloadCache>, view: Arc<SharedView>) -> Self {
        ImageCollection {
            entries: Vec::new(),
            current: None,
            folder: None,
            generation: 0,
            watch: None,
            events: None,
            sink,
            cache,
            view,
        }
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&ImageEntry> {
        self.current.and_then(|i| self.entries.get(i))
    }

    #[allow(dead_code)]
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Directory of the active watch subscription, if one is alive.
    #[allow(dead_code)]
    pub fn watched_dir(&self) -> Option<&Path> {
        self.watch.as_ref().map(|w| w.dir())
    }

    #[allow(dead_code)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Folder loading ──────────────────────────────────────────────────

    /// Load a folder (or a file's parent folder, revealing that file).
    ///
    /// Wholesale replace: the previous watch is closed before the new one
    /// opens (at most one active watch, ever), the entry set is rebuilt from
    /// a fresh scan, and cached payloads of entries that fell out of the
    /// listing are released.
    pub fn set_folder(&mut self, path: &Path, reveal: Option<&Path>) {
        let (folder, reveal) = if path.is_file() {
            (
                path.parent().unwrap_or(path).to_path_buf(),
                Some(path.to_path_buf()),
            )
        } else {
            (path.to_path_buf(), reveal.map(Path::to_path_buf))
        };

        self.generation += 1;
        // Close first: a watch on the old folder must never outlive this call.
        self.watch = None;
        self.events = None;

        self.entries = scanner::scan_folder(&folder);
        self.release_stale_payloads();
        self.folder = Some(folder.clone());

        match FolderWatch::subscribe(&folder, self.generation) {
            Ok((watch, rx)) => {
                self.watch = Some(watch);
                self.events = Some(rx);
            }
            Err(e) => {
                // Recoverable: navigation keeps working on this snapshot,
                // external changes just go unobserved.
                eprintln!("collection: {}", e);
                self.sink
                    .notify(&format!("Folder will not auto-refresh: {}", e), APP_TITLE);
            }
        }

        self.current = reveal
            .and_then(|r| self.position_of(&r))
            .or(if self.entries.is_empty() { None } else { Some(0) });

        self.sink
            .notify(&format!("Loaded files in {}", folder.display()), APP_TITLE);
        self.after_change(true);
    }

    fn position_of(&self, path: &Path) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.path() == Some(path))
            .or_else(|| {
                // A reveal path may arrive in a different lexical form.
                let canon = path.canonicalize().ok()?;
                self.entries.iter().position(|e| {
                    e.path()
                        .and_then(|p| p.canonicalize().ok())
                        .map(|p| p == canon)
                        .unwrap_or(false)
                })
            })
    }

    // ── Navigation ──────────────────────────────────────────────────────

    pub fn show_next(&mut self) {
        let Some(cur) = self.current else {
            self.show_first(false);
            return;
        };
        if cur + 1 < self.entries.len() {
            self.current = Some(cur + 1);
            self.after_change(false);
        } else {
            self.sink.notify("No next image!", APP_TITLE);
        }
    }

    pub fn show_prev(&mut self) {
        let Some(cur) = self.current else {
            self.show_first(false);
            return;
        };
        if cur > 0 {
            self.current = Some(cur - 1);
            self.after_change(false);
        } else {
            self.sink.notify("No previous image!", APP_TITLE);
        }
    }

    /// Select position 0, or the last position if `last` is true.
    pub fn show_first(&mut self, last: bool) {
        if self.entries.is_empty() {
            self.sink.notify("No images!", APP_TITLE);
            if self.current.take().is_some() {
                self.after_change(false);
            }
            return;
        }
        self.current = Some(if last { self.entries.len() - 1 } else { 0 });
        self.after_change(false);
    }

    /// Drop the current entry from the set (the file backing it is gone).
    ///
    /// Tie-break keeps the viewer in place: if current was the last entry
    /// (and not also the first), select the new last; else select whatever
    /// now occupies the old index (the successor); else fall back to
    /// `show_first`.
    pub fn remove_current(&mut self) {
        let Some(old) = self.current else {
            self.show_first(false);
            return;
        };
        if old >= self.entries.len() {
            // Index out of sync with the entry set; recover via first.
            self.current = None;
            self.show_first(false);
            return;
        }

        let removed = self.entries.remove(old);
        if let Some(p) = removed.path() {
            self.cache.evict(p);
        }

        let was_last = old == self.entries.len();
        self.current = if was_last && old > 0 {
            Some(self.entries.len() - 1)
        } else if old < self.entries.len() {
            Some(old)
        } else {
            None
        };

        if self.current.is_none() && !self.entries.is_empty() {
            self.show_first(false);
            self.sink.collection_changed();
            return;
        }
        self.after_change(true);
    }

    // ── Watcher event handling ──────────────────────────────────────────

    /// Drain queued watcher events on the owning thread.
    pub fn pump_events(&mut self) {
        let mut queued = Vec::new();
        if let Some(rx) = &self.events {
            while let Ok(ev) = rx.try_recv() {
                queued.push(ev);
            }
        }
        for ev in queued {
            self.deliver(ev);
        }
    }

    /// Apply one tagged event, discarding it if the generation is stale
    /// (a delayed event from a subscription `set_folder` already replaced).
    pub(crate) fn deliver(&mut self, ev: TaggedEvent) {
        if ev.generation != self.generation {
            eprintln!(
                "collection: dropping stale event (gen {} != {})",
                ev.generation, self.generation
            );
            return;
        }
        self.apply_event(ev.event);
    }

    pub(crate) fn apply_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Created(_) | WatchEvent::Modified(_) => self.rescan(),
            WatchEvent::Removed(path) => {
                let is_current = self
                    .current_entry()
                    .map(|e| e.path() == Some(path.as_path()))
                    .unwrap_or(false);
                if is_current {
                    self.remove_current();
                } else {
                    // The event may race other filesystem changes; a full
                    // rescan is the only safe reconciliation.
                    self.rescan();
                }
            }
            WatchEvent::Overflow => self.rescan(),
        }
        self.sink.notify("Folder changed", APP_TITLE);
    }

    /// Re-scan the watched folder and merge: keep current on its entry if
    /// the path survived; apply the removal tie-break if it vanished.
    fn rescan(&mut self) {
        let Some(folder) = self.folder.clone() else {
            return;
        };
        let old_index = self.current;
        let old_path = self.current_entry().and_then(|e| e.path()).map(Path::to_path_buf);

        self.entries = scanner::scan_folder(&folder);
        self.release_stale_payloads();

        self.current = match (old_path, old_index) {
            (Some(p), Some(old)) => match self.position_of(&p) {
                Some(i) => Some(i),
                None => self.select_after_loss(old),
            },
            _ => {
                if self.entries.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
        };
        self.after_change(true);
    }

    /// removeCurrent-equivalent selection when a rescan dropped the entry
    /// that was current at `old` index.
    fn select_after_loss(&self, old: usize) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else if old >= self.entries.len() {
            Some(self.entries.len() - 1)
        } else {
            Some(old)
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn release_stale_payloads(&self) {
        let keep: HashSet<PathBuf> = self
            .entries
            .iter()
            .filter_map(|e| e.path().map(Path::to_path_buf))
            .collect();
        self.cache.retain_paths(&keep);
    }

    fn after_change(&mut self, collection_changed: bool) {
        self.view.publish(self.entries.clone(), self.current);
        if collection_changed {
            self.sink.collection_changed();
        }
        self.sink.current_changed(self.current_entry());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every sink signal for assertions.
    #[derive(Default)]
    struct RecordingSink {
        notes: Arc<Mutex<Vec<String>>>,
        currents: Arc<Mutex<Vec<Option<String>>>>,
        collection_changes: Arc<Mutex<usize>>,
    }

    impl EventSink for RecordingSink {
        fn current_changed(&self, entry: Option<&ImageEntry>) {
            self.currents
                .lock()
                .unwrap()
                .push(entry.map(|e| e.display()));
        }
        fn collection_changed(&self) {
            *self.collection_changes.lock().unwrap() += 1;
        }
        fn notify(&self, text: &str, _title: &str) {
            self.notes.lock().unwrap().push(text.to_string());
        }
    }

    struct Fixture {
        collection: ImageCollection,
        notes: Arc<Mutex<Vec<String>>>,
        currents: Arc<Mutex<Vec<Option<String>>>>,
        collection_changes: Arc<Mutex<usize>>,
        cache: Arc<PayloadCache>,
        _dir: tempfile::TempDir,
        dir_path: PathBuf,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for n in names {
            std::fs::write(dir.path().join(n), b"x").unwrap();
        }
        let sink = RecordingSink::default();
        let notes = sink.notes.clone();
        let currents = sink.currents.clone();
        let collection_changes = sink.collection_changes.clone();
        let cache = Arc::new(PayloadCache::new());
        let collection = ImageCollection::new(
            Box::new(sink),
            cache.clone(),
            Arc::new(SharedView::new()),
        );
        let dir_path = dir.path().to_path_buf();
        Fixture {
            collection,
            notes,
            currents,
            collection_changes,
            cache,
            _dir: dir,
            dir_path,
        }
    }

    fn current_name(c: &ImageCollection) -> Option<String> {
        c.current_entry()
            .and_then(|e| e.path())
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
    }

    fn last_note(notes: &Arc<Mutex<Vec<String>>>) -> String {
        notes.lock().unwrap().last().cloned().unwrap_or_default()
    }

    #[test]
    fn set_folder_selects_first_sorted() {
        let mut f = fixture(&["c.png", "a.png", "b.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
        assert_eq!(f.collection.entries().len(), 3);
        // The sink saw the load: one collection change, and current landing
        // on a.png.
        assert_eq!(*f.collection_changes.lock().unwrap(), 1);
        let last_current = f.currents.lock().unwrap().last().cloned().unwrap();
        assert!(last_current.unwrap().ends_with("a.png"));
    }

    #[test]
    fn set_folder_with_file_reveals_it() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let file = f.dir_path.join("b.png");
        f.collection.set_folder(&file, None);
        assert_eq!(current_name(&f.collection), Some("b.png".into()));
        assert_eq!(f.collection.folder(), Some(f.dir_path.as_path()));
    }

    #[test]
    fn set_folder_empty_has_no_current() {
        let mut f = fixture(&[]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        assert_eq!(f.collection.current_index(), None);
        assert!(f.collection.entries().is_empty());
    }

    #[test]
    fn set_folder_missing_reveal_falls_back_to_first() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir = f.dir_path.clone();
        let ghost = dir.join("zz.png");
        f.collection.set_folder(&dir, Some(&ghost));
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    #[test]
    fn next_and_prev_walk_the_order() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_next();
        assert_eq!(current_name(&f.collection), Some("b.png".into()));
        f.collection.show_prev();
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    #[test]
    fn next_at_end_is_a_noop_with_notification() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_first(true);
        f.collection.show_next();
        assert_eq!(current_name(&f.collection), Some("b.png".into()));
        assert_eq!(last_note(&f.notes), "No next image!");
    }

    #[test]
    fn prev_at_start_is_a_noop_with_notification() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_prev();
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
        assert_eq!(last_note(&f.notes), "No previous image!");
    }

    #[test]
    fn show_first_last_flag() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_first(true);
        assert_eq!(current_name(&f.collection), Some("c.png".into()));
        f.collection.show_first(false);
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    #[test]
    fn show_first_on_empty_reports_no_images() {
        let mut f = fixture(&[]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_first(false);
        assert_eq!(last_note(&f.notes), "No images!");
    }

    #[test]
    fn remove_current_at_last_selects_previous() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_first(true); // current = c
        f.collection.remove_current();
        assert_eq!(current_name(&f.collection), Some("b.png".into()));
    }

    #[test]
    fn remove_current_in_middle_selects_successor() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_next(); // current = b
        f.collection.remove_current();
        assert_eq!(current_name(&f.collection), Some("c.png".into()));
    }

    #[test]
    fn remove_last_remaining_empties_collection() {
        let mut f = fixture(&["a.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.remove_current();
        assert_eq!(f.collection.current_index(), None);
        assert!(f.collection.entries().is_empty());
        f.collection.show_first(false);
        assert_eq!(last_note(&f.notes), "No images!");
    }

    #[test]
    fn remove_current_evicts_cached_payload() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        let a = f.collection.current_entry().unwrap().clone();
        f.cache.get_or_load(&a);
        assert!(f.cache.has(a.path().unwrap()));
        f.collection.remove_current();
        assert!(!f.cache.has(a.path().unwrap()));
    }

    #[test]
    fn navigation_on_empty_current_falls_back_to_first() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        // Force a "none" cursor, as after a removal that emptied it.
        f.collection.current = None;
        f.collection.show_next();
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    #[test]
    fn second_set_folder_watches_only_the_new_dir() {
        let mut f = fixture(&["a.png"]);
        let dir1 = f.dir_path.clone();
        let dir2 = tempfile::tempdir().unwrap();
        std::fs::write(dir2.path().join("z.png"), b"x").unwrap();

        f.collection.set_folder(&dir1, None);
        let gen1 = f.collection.generation();
        f.collection.set_folder(dir2.path(), None);

        assert_eq!(f.collection.watched_dir(), Some(dir2.path()));
        assert_eq!(f.collection.generation(), gen1 + 1);
    }

    #[test]
    fn stale_generation_event_is_dropped() {
        let mut f = fixture(&["a.png", "b.png"]);
        let dir1 = f.dir_path.clone();
        let dir2 = tempfile::tempdir().unwrap();
        std::fs::write(dir2.path().join("z.png"), b"x").unwrap();

        f.collection.set_folder(&dir1, None);
        let old_gen = f.collection.generation();
        f.collection.set_folder(dir2.path(), None);

        // A delayed delete event from the first subscription must not touch
        // the state loaded from the second folder.
        f.collection.deliver(TaggedEvent {
            generation: old_gen,
            event: WatchEvent::Removed(dir2.path().join("z.png")),
        });
        assert_eq!(current_name(&f.collection), Some("z.png".into()));
        assert_eq!(f.collection.entries().len(), 1);
    }

    #[test]
    fn delete_event_for_current_applies_tie_break() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_next(); // current = b
        let b = dir.join("b.png");
        std::fs::remove_file(&b).unwrap();
        f.collection.apply_event(WatchEvent::Removed(b));
        assert_eq!(current_name(&f.collection), Some("c.png".into()));
        assert_eq!(f.collection.entries().len(), 2);
        assert_eq!(last_note(&f.notes), "Folder changed");
    }

    #[test]
    fn delete_event_for_other_entry_rescans() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None); // current = a
        let c = dir.join("c.png");
        std::fs::remove_file(&c).unwrap();
        f.collection.apply_event(WatchEvent::Removed(c));
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
        assert_eq!(f.collection.entries().len(), 2);
    }

    #[test]
    fn create_event_merges_and_keeps_current() {
        let mut f = fixture(&["b.png", "d.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_next(); // current = d
        let a = dir.join("a.png");
        std::fs::write(&a, b"x").unwrap();
        f.collection.apply_event(WatchEvent::Created(a));
        // d shifted to index 2 but stays current.
        assert_eq!(current_name(&f.collection), Some("d.png".into()));
        assert_eq!(f.collection.entries().len(), 3);
    }

    #[test]
    fn overflow_event_forces_full_rescan() {
        let mut f = fixture(&["a.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        std::fs::write(dir.join("b.png"), b"x").unwrap();
        std::fs::write(dir.join("c.png"), b"x").unwrap();
        f.collection.apply_event(WatchEvent::Overflow);
        assert_eq!(f.collection.entries().len(), 3);
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    #[test]
    fn rescan_losing_current_mid_list_selects_same_slot() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        f.collection.show_next(); // current = b
        std::fs::remove_file(dir.join("b.png")).unwrap();
        // A modify event whose rescan discovers b vanished.
        f.collection.apply_event(WatchEvent::Modified(dir.join("a.png")));
        assert_eq!(current_name(&f.collection), Some("c.png".into()));
    }

    #[test]
    fn rescan_after_everything_vanished() {
        let mut f = fixture(&["a.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        std::fs::remove_file(dir.join("a.png")).unwrap();
        f.collection.apply_event(WatchEvent::Overflow);
        assert_eq!(f.collection.current_index(), None);
        assert!(f.collection.entries().is_empty());
    }

    #[test]
    fn pump_applies_real_watcher_events() {
        let mut f = fixture(&["a.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        assert!(f.collection.watched_dir().is_some());
        std::thread::sleep(std::time::Duration::from_millis(300));

        std::fs::write(dir.join("b.png"), b"x").unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            f.collection.pump_events();
            if f.collection.entries().len() == 2 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        assert_eq!(f.collection.entries().len(), 2);
        assert_eq!(current_name(&f.collection), Some("a.png".into()));
    }

    /// The end-to-end scenario: a/b/c, advance to b, external delete of b,
    /// then bump against the end on [a, c].
    #[test]
    fn scenario_delete_then_navigate() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let dir = f.dir_path.clone();
        f.collection.set_folder(&dir, None);
        assert_eq!(current_name(&f.collection), Some("a.png".into()));

        f.collection.show_next();
        assert_eq!(current_name(&f.collection), Some("b.png".into()));

        let b = dir.join("b.png");
        std::fs::remove_file(&b).unwrap();
        f.collection.apply_event(WatchEvent::Removed(b));
        assert_eq!(current_name(&f.collection), Some("c.png".into()));

        f.collection.show_next();
        assert_eq!(current_name(&f.collection), Some("c.png".into()));
        assert_eq!(last_note(&f.notes), "No next image!");
    }
}
