//! Image catalog: the ordered list of files the producer walks through.
//!
//! Built either by scanning a photo library recursively (then shuffled) or
//! from a slideshow file listing images with optional per-image durations.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::error::Error;
use crate::events::CatalogCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub display_name: String,
    /// Display duration from a slideshow file; `None` uses the default.
    pub duration: Option<Duration>,
}

pub trait Catalog: Send {
    /// Returns the next entry in the current direction, wrapping around.
    fn next_entry(&mut self) -> Option<CatalogEntry>;

    fn set_direction(&mut self, direction: Direction);

    fn apply(&mut self, command: CatalogCommand);
}

#[derive(Debug, Clone)]
struct Item {
    path: PathBuf,
    duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PhotoCatalog {
    root: PathBuf,
    items: Vec<Item>,
    cursor: usize,
    direction: Direction,
}

impl PhotoCatalog {
    /// Recursively scans `root` for images, skipping hidden files and
    /// directories, and shuffles the result.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn from_directory(root: &Path, seed: Option<u64>) -> Result<Self, Error> {
        if !root.is_dir() {
            return Err(Error::BadDir(root.display().to_string()));
        }
        let mut items: Vec<Item> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && is_image(e.path()))
            .map(|e| Item {
                path: e.into_path(),
                duration: None,
            })
            .collect();
        if items.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        // sort first so a fixed seed yields a fixed order regardless of readdir order
        items.sort_by(|a, b| a.path.cmp(&b.path));
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        items.shuffle(&mut rng);
        info!(discovered = items.len(), "catalog scan complete (shuffled)");

        Ok(Self::from_items(root.to_path_buf(), items))
    }

    /// Reads a slideshow file. Relative entries resolve against the file's
    /// directory, which is also the root for display names.
    #[instrument(skip_all, fields(file = %path.display()))]
    pub fn from_slideshow_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let items: Vec<Item> = parse_slideshow(&text)
            .into_iter()
            .map(|(entry, duration)| Item {
                path: if entry.is_absolute() {
                    entry
                } else {
                    root.join(entry)
                },
                duration,
            })
            .collect();
        if items.is_empty() {
            return Err(Error::EmptyCatalog);
        }
        info!(entries = items.len(), "slideshow file loaded");
        Ok(Self::from_items(root, items))
    }

    fn from_items(root: PathBuf, items: Vec<Item>) -> Self {
        Self {
            root,
            items,
            cursor: 0,
            direction: Direction::Forward,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Advances `n` entries in the current direction without returning them.
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn advance(&mut self) {
        let len = self.items.len();
        self.cursor = match self.direction {
            Direction::Forward => (self.cursor + 1) % len,
            Direction::Backward => (self.cursor + len - 1) % len,
        };
    }
}

impl Catalog for PhotoCatalog {
    fn next_entry(&mut self) -> Option<CatalogEntry> {
        let item = self.items.get(self.cursor)?.clone();
        self.advance();
        let display_name = display_name(&self.root, &item.path);
        debug!(path = %item.path.display(), name = %display_name, "next catalog entry");
        Some(CatalogEntry {
            path: item.path,
            display_name,
            duration: item.duration,
        })
    }

    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    fn apply(&mut self, command: CatalogCommand) {
        match command {
            CatalogCommand::SetDirection(direction) => self.set_direction(direction),
            CatalogCommand::Skip(n) => self.skip(n),
            CatalogCommand::SkipBack(n) => {
                self.direction = Direction::Backward;
                self.skip(n);
                self.direction = Direction::Forward;
            }
        }
    }
}

/// Parses slideshow file contents into `(path, duration)` pairs.
///
/// `#` starts a comment. A trailing integer is the duration in seconds, with
/// 0 meaning the default. Lines that are only digits are ignored.
pub fn parse_slideshow(text: &str) -> Vec<(PathBuf, Option<Duration>)> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim_end();
        if line.is_empty() {
            continue;
        }
        let name = line.trim_end_matches(|c: char| c.is_ascii_digit());
        if name.is_empty() {
            continue;
        }
        let seconds: u64 = line[name.len()..].parse().unwrap_or(0);
        let name = name.trim_end();
        if name.is_empty() {
            continue;
        }
        let duration = (seconds > 0).then(|| Duration::from_secs(seconds));
        entries.push((PathBuf::from(name), duration));
    }
    entries
}

/// Human-readable caption for `path`: its location under `root` with
/// separators shown as ", ", underscores as spaces, no `.jpg` suffix, and
/// camera default file names (`DCP_1234`, `PICT0001`) left out.
pub fn display_name(root: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return String::new();
    };
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().replace('_', " ")),
            _ => None,
        })
        .collect();

    if let Some(last) = parts.last_mut() {
        let lower = last.to_ascii_lowercase();
        for suffix in [".jpg", ".jpeg"] {
            if lower.ends_with(suffix) {
                last.truncate(last.len() - suffix.len());
                break;
            }
        }
    }
    if parts.len() > 1 && parts.last().is_some_and(|last| is_camera_name(last)) {
        parts.pop();
    }
    parts.join(", ")
}

fn is_camera_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("dcp")
        || lower
            .strip_prefix("pict")
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

#[inline]
fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp"].contains(&e.as_str())
    )
}
