// wiv: folder image viewer core with live filesystem sync and look-ahead
// caching. The collection state machine, watcher and prefetcher run for
// real; display is a line-oriented terminal driver standing in for the UI
// collaborator (rendering and widget layout live outside this crate).

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("GIT_HASH");

mod collection;
mod entry;
mod fileops;
mod metadata;
mod prefetch;
mod scanner;
mod settings;
mod watcher;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use collection::{EventSink, ImageCollection, APP_TITLE};
use entry::{ImageEntry, Payload};
use prefetch::{PayloadCache, Prefetcher, SharedView, DEFAULT_WINDOW_RADIUS};
use settings::Settings;

/// Strip Windows extended-length path prefix (`\\?\`) if present.
/// Windows `canonicalize` returns `\\?\C:\...` paths; we strip the prefix
/// so paths display cleanly.
pub(crate) fn clean_path(p: &str) -> String {
    p.strip_prefix(r"\\?\").unwrap_or(p).to_string()
}

#[derive(Parser)]
#[command(name = "wiv", version = VERSION, about = "folder image viewer")]
struct Cli {
    /// Folder to open, or an image file to open at (defaults to the cwd)
    path: Option<PathBuf>,

    /// Entries kept cached on each side of the current one
    #[arg(long, default_value_t = DEFAULT_WINDOW_RADIUS)]
    radius: usize,
}

/// Prints collection signals to the terminal. Stands in for toast
/// notifications and widget re-binding.
struct TerminalSink;

impl EventSink for TerminalSink {
    fn current_changed(&self, entry: Option<&ImageEntry>) {
        match entry {
            Some(e) => println!("-> {}", clean_path(&e.display())),
            None => println!("-> (nothing selected)"),
        }
    }

    fn collection_changed(&self) {}

    fn notify(&self, text: &str, title: &str) {
        println!("[{}] {}", title, text);
    }
}

// ── Commands ────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Next,
    Prev,
    First,
    Last,
    Open(PathBuf),
    Info,
    CopyTo(u8),
    MoveTo(u8),
    SetQuick(u8, PathBuf),
    Delete,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next()?;
    match cmd {
        "n" => Some(Command::Next),
        "p" => Some(Command::Prev),
        "g" => Some(Command::First),
        "G" => Some(Command::Last),
        "o" => Some(Command::Open(PathBuf::from(parts.next()?))),
        "i" => Some(Command::Info),
        "c" => Some(Command::CopyTo(parts.next()?.parse().ok()?)),
        "m" => Some(Command::MoveTo(parts.next()?.parse().ok()?)),
        "s" => {
            let slot = parts.next()?.parse().ok()?;
            Some(Command::SetQuick(slot, PathBuf::from(parts.next()?)))
        }
        "x" => Some(Command::Delete),
        "h" | "?" => Some(Command::Help),
        "q" => Some(Command::Quit),
        _ => None,
    }
}

const HELP: &str = "\
commands:
  n / p        next / previous image
  g / G        first / last image
  o PATH       open folder (or file, revealing it)
  i            show EXIF/GPS metadata of the current image
  c N / m N    copy / move current file to quick folder N (1-6)
  s N PATH     assign quick folder N
  x            delete the current file
  q            quit";

// ── App context ─────────────────────────────────────────────────────────

/// Everything the driver owns, constructed once in main and passed down.
struct App {
    collection: ImageCollection,
    cache: Arc<PayloadCache>,
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl App {
    fn show_current(&self) {
        let Some(entry) = self.collection.current_entry() else {
            return;
        };
        let pos = self.collection.current_index().map(|i| i + 1).unwrap_or(0);
        let total = self.collection.entries().len();
        let payload = self.cache.get_or_load(entry);
        match payload.label() {
            Some(label) => println!("   ({}/{}) [{}]", pos, total, label),
            None => {
                if let Payload::Image(img) = &*payload {
                    println!("   ({}/{}) {}x{} px", pos, total, img.width, img.height);
                }
            }
        }
    }

    fn show_info(&self) {
        let Some(path) = self.collection.current_entry().and_then(|e| e.path()) else {
            println!("[{}] Nothing selected", APP_TITLE);
            return;
        };
        match metadata::read_metadata(path) {
            Some(meta) => {
                print!("{}", meta.tags);
                if let Some((lat, lon)) = meta.gps {
                    println!("position: {:.6}, {:.6}", lat, lon);
                }
                if let Some(o) = meta.orientation {
                    println!(
                        "orientation: {} (rotate {}°)",
                        o,
                        metadata::rotation_for_orientation(o)
                    );
                }
            }
            None => println!("[{}] No metadata in {}", APP_TITLE, path.display()),
        }
    }

    fn quick_op(&mut self, slot: u8, mover: bool) {
        let Some(source) = self
            .collection
            .current_entry()
            .and_then(|e| e.path())
            .map(PathBuf::from)
        else {
            println!("[{}] Nothing selected", APP_TITLE);
            return;
        };
        let Some(target) = self.settings.quick_folder(slot).map(PathBuf::from) else {
            println!("[{}] Quick folder {} is not assigned", APP_TITLE, slot);
            return;
        };
        let res = if mover {
            fileops::quick_move(&source, &target)
        } else {
            fileops::quick_copy(&source, &target)
        };
        match res {
            Ok(dest) => println!(
                "[{}] {} to {}",
                APP_TITLE,
                if mover { "Moved" } else { "Copied" },
                dest.display()
            ),
            Err(e) => println!("[{}] {}", APP_TITLE, e),
        }
    }

    fn delete_current(&mut self) {
        let Some(path) = self
            .collection
            .current_entry()
            .and_then(|e| e.path())
            .map(PathBuf::from)
        else {
            println!("[{}] Nothing selected", APP_TITLE);
            return;
        };
        if let Err(e) = fileops::delete_file(&path) {
            println!("[{}] {}", APP_TITLE, e);
        }
        // The watcher's remove event updates the collection.
    }

    /// Returns false when the driver should exit.
    fn run_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Next => self.collection.show_next(),
            Command::Prev => self.collection.show_prev(),
            Command::First => self.collection.show_first(false),
            Command::Last => self.collection.show_first(true),
            Command::Open(path) => self.collection.set_folder(&path, None),
            Command::Info => self.show_info(),
            Command::CopyTo(slot) => self.quick_op(slot, false),
            Command::MoveTo(slot) => self.quick_op(slot, true),
            Command::SetQuick(slot, path) => {
                let ok = self
                    .settings
                    .set_quick_folder(slot, path.display().to_string());
                if !ok {
                    println!("[{}] Quick folder slots are 1-6", APP_TITLE);
                }
            }
            Command::Delete => self.delete_current(),
            Command::Help => println!("{}", HELP),
            Command::Quit => {
                if let Some(path) = &self.settings_path {
                    if let Err(e) = self.settings.save(path) {
                        eprintln!("settings: save failed: {}", e);
                    }
                }
                return false;
            }
        }
        self.show_current();
        true
    }
}

fn main() {
    let cli = Cli::parse();
    eprintln!("wiv {} ({})", VERSION, GIT_HASH);

    let settings_path = settings::settings_file();
    let settings = settings_path
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();
    eprintln!(
        "settings: window {}x{}, {} quick folders",
        settings.window_w,
        settings.window_h,
        settings.quick_folders.len()
    );

    let cache = Arc::new(PayloadCache::new());
    let view = Arc::new(SharedView::new());
    let _prefetcher = Prefetcher::start(
        view.clone(),
        cache.clone(),
        cli.radius,
        Duration::from_millis(50),
    );

    let mut app = App {
        collection: ImageCollection::new(Box::new(TerminalSink), cache.clone(), view),
        cache,
        settings,
        settings_path,
    };

    let start = cli
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    app.collection.set_folder(&start, None);
    app.show_current();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        // Apply external changes before acting on the command.
        app.collection.pump_events();

        let trimmed = line.trim();
        if trimmed.is_empty() {
            app.collection.pump_events();
            app.show_current();
            continue;
        }
        match parse_command(trimmed) {
            Some(cmd) => {
                if !app.run_command(cmd) {
                    break;
                }
            }
            None => println!("{}", HELP),
        }
    }
}
