//! Payload cache + background prefetcher.
//!
//! The cache keeps decoded payloads keyed by path behind one lock, with a
//! per-path in-flight guard so a given file is decoded at most once at a
//! time. Display-triggered loads are authoritative (always stored); prefetch
//! loads are best-effort (stored only into a vacant slot).
//!
//! The prefetcher thread polls a shared view snapshot (entry list + current
//! index) published by the collection. When the current index moves it runs
//! a sweep: forward from `current + 1` out to `current + radius`, then
//! backward from `current - 1` down to `current - radius`, decoding anything
//! missing; when the backward pass completes it evicts every payload whose
//! ordinal distance from current exceeds the radius. Forward-first matches
//! the dominant navigation direction, and deferring eviction to the end of a
//! sweep keeps a brief direction reversal from thrashing the cache.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::entry::{ImageEntry, Payload};

pub const DEFAULT_WINDOW_RADIUS: usize = 3;

// ── Payload cache ───────────────────────────────────────────────────────

struct CacheInner {
    map: HashMap<PathBuf, Arc<Payload>>,
    loading: HashSet<PathBuf>,
}

pub struct PayloadCache {
    inner: Mutex<CacheInner>,
}

impl PayloadCache {
    pub fn new() -> Self {
        PayloadCache {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                loading: HashSet::new(),
            }),
        }
    }

    pub fn has(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().map.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Payload>> {
        self.inner.lock().unwrap().map.get(path).cloned()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// Store a display-triggered load. Always wins over a racing prefetch.
    pub fn insert_display(&self, path: &Path, payload: Arc<Payload>) {
        self.inner
            .lock()
            .unwrap()
            .map
            .insert(path.to_path_buf(), payload);
    }

    /// Store a prefetch result. Vacant-only: a display load that got there
    /// first is authoritative.
    pub fn insert_prefetch(&self, path: &Path, payload: Arc<Payload>) {
        self.inner
            .lock()
            .unwrap()
            .map
            .entry(path.to_path_buf())
            .or_insert(payload);
    }

    /// Claim the decode slot for `path`. Returns false if a decode is
    /// already in flight.
    pub fn begin_load(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().loading.insert(path.to_path_buf())
    }

    pub fn end_load(&self, path: &Path) {
        self.inner.lock().unwrap().loading.remove(path);
    }

    pub fn evict(&self, path: &Path) {
        self.inner.lock().unwrap().map.remove(path);
    }

    /// Drop every payload whose path is not in `keep`.
    pub fn retain_paths(&self, keep: &HashSet<PathBuf>) {
        self.inner
            .lock()
            .unwrap()
            .map
            .retain(|p, _| keep.contains(p));
    }

    /// Display path: return the cached payload, or decode now. If a prefetch
    /// decode of the same file is in flight, wait for it rather than decoding
    /// the same bytes twice.
    pub fn get_or_load(&self, entry: &ImageEntry) -> Arc<Payload> {
        let Some(path) = entry.path() else {
            return Arc::new(entry.load_payload());
        };
        loop {
            if let Some(p) = self.get(path) {
                return p;
            }
            if self.begin_load(path) {
                let payload = Arc::new(entry.load_payload());
                self.insert_display(path, payload.clone());
                self.end_load(path);
                return payload;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Default for PayloadCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared view snapshot ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ViewSnapshot {
    pub entries: Vec<ImageEntry>,
    pub current: Option<usize>,
}

/// Snapshot of the collection published for the prefetcher. Staleness is
/// safe: the sweep re-reads it every tick.
#[derive(Default)]
pub struct SharedView {
    inner: Mutex<ViewSnapshot>,
}

impl SharedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, entries: Vec<ImageEntry>, current: Option<usize>) {
        *self.inner.lock().unwrap() = ViewSnapshot { entries, current };
    }

    pub fn read(&self) -> ViewSnapshot {
        self.inner.lock().unwrap().clone()
    }
}

// ── Sweep state machine ─────────────────────────────────────────────────

/// Tracks the cache cursor across ticks. `sweep` drives one full pass;
/// the thread loop calls it whenever the observed current index changed.
pub struct SweepState {
    last_current: Option<usize>,
    cache_cursor: i64,
    needs_caching: bool,
}

impl SweepState {
    pub fn new() -> Self {
        SweepState {
            last_current: None,
            cache_cursor: 0,
            needs_caching: false,
        }
    }

    /// Compare the observed current index against the last known one; on
    /// change, restart the sweep at `current + 1` (forward pass first).
    pub fn observe(&mut self, current: Option<usize>) {
        if current != self.last_current {
            self.last_current = current;
            if let Some(cur) = current {
                self.cache_cursor = cur as i64 + 1;
                self.needs_caching = true;
            } else {
                self.needs_caching = false;
            }
        }
    }

    pub fn needs_caching(&self) -> bool {
        self.needs_caching
    }

    /// Run the sweep to completion against one snapshot.
    pub fn sweep(
        &mut self,
        entries: &[ImageEntry],
        current: usize,
        cache: &PayloadCache,
        radius: usize,
    ) {
        let len = entries.len() as i64;
        let cur = current as i64;
        let radius = radius as i64;

        while self.needs_caching {
            if self.cache_cursor >= cur {
                // Forward pass.
                if self.cache_cursor >= len || self.cache_cursor > cur + radius {
                    self.cache_cursor = cur - 1;
                } else {
                    ensure_cached(&entries[self.cache_cursor as usize], cache);
                    self.cache_cursor += 1;
                }
            } else {
                // Backward pass.
                if self.cache_cursor < 0 || self.cache_cursor < cur - radius {
                    evict_outside_window(entries, current, cache, radius as usize);
                    self.needs_caching = false;
                } else {
                    ensure_cached(&entries[self.cache_cursor as usize], cache);
                    self.cache_cursor -= 1;
                }
            }
        }
    }
}

impl Default for SweepState {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_cached(entry: &ImageEntry, cache: &PayloadCache) {
    let Some(path) = entry.path() else { return };
    if cache.has(path) {
        return;
    }
    if !cache.begin_load(path) {
        // Someone else is decoding this entry right now.
        return;
    }
    let payload = Arc::new(entry.load_payload());
    cache.insert_prefetch(path, payload);
    cache.end_load(path);
}

/// Keep only payloads within `radius` ordinal positions of `current`;
/// everything else (including paths no longer listed) is released.
fn evict_outside_window(
    entries: &[ImageEntry],
    current: usize,
    cache: &PayloadCache,
    radius: usize,
) {
    let lo = current.saturating_sub(radius);
    let hi = (current + radius).min(entries.len().saturating_sub(1));
    let keep: HashSet<PathBuf> = entries
        .get(lo..=hi)
        .unwrap_or(&[])
        .iter()
        .filter_map(|e| e.path().map(Path::to_path_buf))
        .collect();
    cache.retain_paths(&keep);
}

// ── Background prefetcher thread ────────────────────────────────────────

/// Handle to the running prefetcher. Drop to stop.
pub struct Prefetcher {
    quit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Prefetcher {
    pub fn start(
        view: Arc<SharedView>,
        cache: Arc<PayloadCache>,
        radius: usize,
        poll: Duration,
    ) -> Self {
        let quit = Arc::new(AtomicBool::new(false));
        let quit2 = quit.clone();

        let thread = thread::Builder::new()
            .name("prefetch".into())
            .spawn(move || {
                let mut state = SweepState::new();
                while !quit2.load(Ordering::Relaxed) {
                    let snap = view.read();
                    state.observe(snap.current);
                    match snap.current {
                        Some(cur) if state.needs_caching() && cur < snap.entries.len() => {
                            state.sweep(&snap.entries, cur, &cache, radius);
                        }
                        _ => thread::sleep(poll),
                    }
                }
                eprintln!("prefetch: stopped");
            })
            .expect("failed to spawn prefetch thread");

        Prefetcher {
            quit,
            thread: Some(thread),
        }
    }

    pub fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.stop();
    }
}
