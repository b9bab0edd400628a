// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded on-disk rolling buffer of rendered frames.
//!
//! The category directory is the source of truth. A [`FrameStore`] keeps an
//! ordered index of the frame files in it, rebuilt from the directory listing
//! on first use and kept in sync as frames are registered and evicted.
//! Frame file names are UTC timestamps (`YYYYMMDD-HHMM.png`), so sorting by
//! name sorts by observation time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};

use crate::category::Category;

/// Number of frames retained per category unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 18;

/// `strftime` pattern of frame file stems.
pub const FRAME_NAME_FORMAT: &str = "%Y%m%d-%H%M";

/// Extension of rendered frame files.
pub const FRAME_EXTENSION: &str = "png";

/// Extension of files still being written.
pub const PARTIAL_EXTENSION: &str = "part";

/// File name of the per-category animation.
pub const ANIMATION_FILE_NAME: &str = "animated.gif";

/// Ordered, bounded set of frame files for one category.
#[derive(Debug)]
pub struct FrameStore {
    category: Category,
    dir: PathBuf,
    capacity: usize,
    frames: Vec<PathBuf>,
    indexed: bool,
}

impl FrameStore {
    /// Create a store for `category` under `root`. Nothing is read until the
    /// store is indexed.
    #[must_use]
    pub fn new(root: &Path, category: Category, capacity: usize) -> Self {
        Self {
            category,
            dir: root.join(category.dir_name()),
            capacity: capacity.max(1),
            frames: Vec::new(),
            indexed: false,
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Directory holding this category's frames and animation.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Path of the frame for the observation minute containing `time`.
    #[must_use]
    pub fn frame_path(&self, time: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "{}.{FRAME_EXTENSION}",
            time.format(FRAME_NAME_FORMAT)
        ))
    }

    /// Whether a frame for the observation minute of `time` exists on disk.
    #[must_use]
    pub fn has_frame(&self, time: DateTime<Utc>) -> bool {
        self.frame_path(time).is_file()
    }

    #[must_use]
    pub fn animation_path(&self) -> PathBuf {
        self.dir.join(ANIMATION_FILE_NAME)
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Drop the in-memory index; the next [`ensure_indexed`](Self::ensure_indexed)
    /// rereads the directory.
    pub fn invalidate(&mut self) {
        self.frames.clear();
        self.indexed = false;
    }

    /// Rebuild the index from disk unless that already happened.
    pub fn ensure_indexed(&mut self) -> io::Result<()> {
        if self.indexed {
            return Ok(());
        }
        self.rebuild_from_disk()
    }

    /// Reread the category directory, keep the newest frames up to capacity
    /// and delete the older ones from disk. Unfinished `.part` files left by
    /// an interrupted write are deleted too.
    ///
    /// A missing directory yields an empty set.
    pub fn rebuild_from_disk(&mut self) -> io::Result<()> {
        let mut frames = Vec::new();
        match fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    if is_partial(&path) {
                        remove_best_effort(&path);
                    } else if frame_time(&path).is_some() {
                        frames.push(path);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        frames.sort();
        self.frames = frames;
        self.indexed = true;

        let evicted = self.evict_overflow();
        debug!(
            "Indexed {} frame(s) for {} ({} evicted)",
            self.frames.len(),
            self.category,
            evicted.len()
        );
        Ok(())
    }

    /// Add a newly rendered frame and evict the oldest frames beyond capacity.
    ///
    /// Registering a path that is already present does not grow the set.
    /// Returns the paths that were evicted.
    pub fn register(&mut self, path: PathBuf) -> Vec<PathBuf> {
        self.frames.push(path);
        self.frames.sort();
        self.frames.dedup();
        self.evict_overflow()
    }

    /// Current frames, oldest first.
    #[must_use]
    pub fn list(&self) -> &[PathBuf] {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Create the category directory.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Delete the category directory with everything in it and reset the index.
    pub fn reclaim(&mut self) -> io::Result<()> {
        self.invalidate();
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn evict_overflow(&mut self) -> Vec<PathBuf> {
        if self.frames.len() <= self.capacity {
            return Vec::new();
        }
        let overflow = self.frames.len() - self.capacity;
        let evicted: Vec<PathBuf> = self.frames.drain(..overflow).collect();
        for path in &evicted {
            remove_best_effort(path);
        }
        evicted
    }
}

/// Observation time encoded in a frame file name.
#[must_use]
pub fn frame_time(path: &Path) -> Option<DateTime<Utc>> {
    if path.extension()?.to_str()? != FRAME_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDateTime::parse_from_str(stem, FRAME_NAME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == PARTIAL_EXTENSION)
}

/// Delete a file, treating "already gone" as success.
fn remove_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove old frame {}: {}", path.display(), e),
    }
}
