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

//! Polling orchestrator and consumer-facing API.
//!
//! [`RadarLoop`] owns one frame store per category and drives the
//! fetch → compose → store → animate cycle. Consumers register interest in a
//! category; only categories with at least one consumer are polled.
//!
//! Each category is guarded by its own async mutex for the length of a cycle,
//! so a forced refresh or a registration change never interleaves with a poll
//! of the same category. Decoding, composing, encoding and directory work run
//! on the blocking thread pool.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::animation::AnimationAssembler;
use crate::annotate::Annotator;
use crate::assets::Templates;
use crate::category::Category;
use crate::compositor::Compositor;
use crate::error::{Error, Result};
use crate::frame_store::{FrameStore, ANIMATION_FILE_NAME};
use crate::settings::{MarkerSetting, Settings};
use crate::source::{TileEntry, TileSource};
use crate::RadarConfig;

/// What happened to one category during a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// No consumer is registered; nothing was fetched.
    Inactive,
    /// The cycle ran to completion.
    Updated {
        /// Tiles downloaded this cycle.
        downloaded: usize,
        /// Frames added to the store this cycle.
        registered: usize,
        /// Frames in the store afterwards.
        frames: usize,
        /// Whether an animation was written.
        animated: bool,
    },
    /// A fetch failed and the rest of the category was skipped.
    Aborted {
        downloaded: usize,
        registered: usize,
        reason: String,
    },
}

/// Summary of one [`RadarLoop::poll_all`] run.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub outcomes: Vec<(Category, CategoryOutcome)>,
    pub finished_at: DateTime<Utc>,
}

impl PollReport {
    /// Total tiles downloaded across all categories.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                CategoryOutcome::Inactive => 0,
                CategoryOutcome::Updated { downloaded, .. }
                | CategoryOutcome::Aborted { downloaded, .. } => *downloaded,
            })
            .sum()
    }

    /// Outcome for a single category.
    #[must_use]
    pub fn outcome(&self, category: Category) -> Option<&CategoryOutcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, outcome)| outcome)
    }
}

impl fmt::Display for PollReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll finished at {}", self.finished_at.format("%H:%M:%S"))?;
        for (category, outcome) in &self.outcomes {
            match outcome {
                CategoryOutcome::Inactive => {}
                CategoryOutcome::Updated {
                    downloaded, frames, ..
                } => write!(f, "; {category}: {downloaded} new, {frames} frames")?,
                CategoryOutcome::Aborted { reason, .. } => {
                    write!(f, "; {category}: aborted ({reason})")?;
                }
            }
        }
        Ok(())
    }
}

struct CategorySlot {
    consumers: usize,
    store: Arc<StdMutex<FrameStore>>,
}

#[derive(Debug, Default)]
struct CycleStats {
    downloaded: usize,
    registered: usize,
}

/// The radar loop: fetches, composes, stores and animates weather imagery.
pub struct RadarLoop<S> {
    source: S,
    storage_root: PathBuf,
    recency_window: Duration,
    compositor: Arc<Compositor>,
    assembler: Arc<AnimationAssembler>,
    slots: BTreeMap<Category, Mutex<CategorySlot>>,
    settings: RwLock<Settings>,
}

impl<S: TileSource> RadarLoop<S> {
    /// Create the loop. Templates and the font are loaded here, so this does
    /// blocking file I/O and belongs in startup code.
    pub fn new(source: S, config: RadarConfig) -> Self {
        let templates = Templates::load(config.assets_dir.as_deref());
        let annotator = Annotator::with_font_file(config.time_zone, config.font_path.as_deref());
        let assembler = AnimationAssembler::new(templates.marker.clone())
            .with_delays(config.frame_delay, config.final_frame_delay);
        let compositor = Compositor::new(templates, annotator);

        let slots = Category::ALL
            .into_iter()
            .map(|category| {
                let store = FrameStore::new(&config.storage_root, category, config.retention);
                let slot = CategorySlot {
                    consumers: 0,
                    store: Arc::new(StdMutex::new(store)),
                };
                (category, Mutex::new(slot))
            })
            .collect();

        let recency_window =
            Duration::from_std(config.recency_window).unwrap_or_else(|_| Duration::hours(12));

        Self {
            source,
            storage_root: config.storage_root,
            recency_window,
            compositor: Arc::new(compositor),
            assembler: Arc::new(assembler),
            slots,
            settings: RwLock::new(Settings {
                marker: config.marker,
                last_updated: None,
            }),
        }
    }

    fn slot(&self, category: Category) -> &Mutex<CategorySlot> {
        &self.slots[&category]
    }

    /// Register a consumer of `category`.
    ///
    /// The first consumer activates the category and creates its directory.
    pub async fn register_category(&self, category: Category) -> Result<()> {
        let mut slot = self.slot(category).lock().await;
        if slot.consumers == 0 {
            on_store(&slot.store, |store| store.prepare()).await??;
            info!("Activated {}", category);
        }
        slot.consumers += 1;
        Ok(())
    }

    /// Drop a consumer of `category`.
    ///
    /// When the last consumer goes away the category stops being polled and
    /// its directory is deleted. Deregistering an inactive category is a no-op.
    pub async fn deregister_category(&self, category: Category) -> Result<()> {
        let mut slot = self.slot(category).lock().await;
        if slot.consumers == 0 {
            debug!("{} has no consumers to drop", category);
            return Ok(());
        }
        slot.consumers -= 1;
        if slot.consumers == 0 {
            on_store(&slot.store, FrameStore::reclaim).await??;
            info!("Deactivated {} and removed its frames", category);
        }
        Ok(())
    }

    /// Whether at least one consumer is registered for `category`.
    pub async fn is_active(&self, category: Category) -> bool {
        self.slot(category).lock().await.consumers > 0
    }

    /// Path of the animation for `category`, whether or not it exists yet.
    #[must_use]
    pub fn animation_path(&self, category: Category) -> PathBuf {
        self.storage_root
            .join(category.dir_name())
            .join(ANIMATION_FILE_NAME)
    }

    /// Current animation bytes, or `None` when none has been produced.
    ///
    /// Animations are replaced by rename, so this never sees a partial file
    /// and does not wait for a running poll.
    pub async fn animated_image(&self, category: Category) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.animation_path(category)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Frames currently stored for `category`, oldest first.
    ///
    /// An inactive category is not indexed, so its directory is left alone
    /// and whatever index is already in memory is returned.
    pub async fn frames(&self, category: Category) -> Result<Vec<PathBuf>> {
        let slot = self.slot(category).lock().await;
        if slot.consumers == 0 {
            let store = slot.store.lock().unwrap_or_else(PoisonError::into_inner);
            return Ok(store.list().to_vec());
        }
        on_store(&slot.store, |store| {
            store.ensure_indexed().map(|()| store.list().to_vec())
        })
        .await?
        .map_err(Error::from)
    }

    /// Drop the in-memory index of `category` and reread its directory.
    ///
    /// Returns the number of frames found.
    pub async fn reindex(&self, category: Category) -> Result<usize> {
        let slot = self.slot(category).lock().await;
        on_store(&slot.store, |store| {
            store.invalidate();
            store.ensure_indexed().map(|()| store.len())
        })
        .await?
        .map_err(Error::from)
    }

    #[must_use]
    pub fn marker(&self) -> MarkerSetting {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .marker
    }

    /// Update the marker position. Either coordinate may be left as is.
    ///
    /// Takes effect on the next animation rebuild.
    pub fn set_marker_location(&self, latitude: Option<f64>, longitude: Option<f64>) -> Result<()> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        settings.marker.set_location(latitude, longitude)?;
        info!(
            "Marker moved to {:?}, {:?}",
            settings.marker.latitude, settings.marker.longitude
        );
        Ok(())
    }

    /// Enable or disable the marker. Takes effect on the next animation rebuild.
    pub fn set_show_marker(&self, show: bool) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .marker
            .show = show;
        info!("Marker {}", if show { "shown" } else { "hidden" });
    }

    /// When the last full poll finished.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_updated
    }

    /// Rebuild the animation of every active category from the frames
    /// already on disk, without fetching anything.
    ///
    /// Returns the number of frames encoded per active category; `None` when
    /// nothing could be encoded. Failures are logged.
    pub async fn force_refresh(&self) -> Vec<(Category, Option<usize>)> {
        let mut results = Vec::new();
        for category in Category::ALL {
            let slot = self.slot(category).lock().await;
            if slot.consumers == 0 {
                continue;
            }
            let count = match self.rebuild_animation(category, &slot.store).await {
                Ok(count) => count,
                Err(e) => {
                    error!("Failed to rebuild {} animation: {}", category, e);
                    None
                }
            };
            results.push((category, count));
        }
        results
    }

    /// Rebuild a single category's animation. Inactive categories are skipped.
    pub async fn rebuild_category(&self, category: Category) -> Result<Option<usize>> {
        let slot = self.slot(category).lock().await;
        if slot.consumers == 0 {
            debug!("Not rebuilding inactive {}", category);
            return Ok(None);
        }
        self.rebuild_animation(category, &slot.store).await
    }

    /// Poll every active category in turn and record the completion time.
    ///
    /// A failure in one category never stops the others.
    pub async fn poll_all(&self) -> PollReport {
        let mut outcomes = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            outcomes.push((category, self.poll_category(category).await));
        }

        let finished_at = Utc::now();
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_updated = Some(finished_at);

        PollReport {
            outcomes,
            finished_at,
        }
    }

    /// Run one fetch cycle for `category`.
    ///
    /// New entries are downloaded, composed and registered in ascending time
    /// order. The first fetch failure ends the cycle; the animation is still
    /// rebuilt if frames were added before it.
    pub async fn poll_category(&self, category: Category) -> CategoryOutcome {
        let slot = self.slot(category).lock().await;
        if slot.consumers == 0 {
            return CategoryOutcome::Inactive;
        }

        let mut stats = CycleStats::default();
        let result = self.fetch_new_frames(category, &slot.store, &mut stats).await;

        let animated = if result.is_ok() || stats.registered > 0 {
            match self.rebuild_animation(category, &slot.store).await {
                Ok(count) => count.is_some(),
                Err(e) => {
                    error!("Failed to rebuild {} animation: {}", category, e);
                    false
                }
            }
        } else {
            false
        };

        match result {
            Ok(()) => {
                let frames = slot
                    .store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len();
                if stats.downloaded > 0 {
                    info!(
                        "{}: {} new frame(s), {} stored",
                        category, stats.registered, frames
                    );
                }
                CategoryOutcome::Updated {
                    downloaded: stats.downloaded,
                    registered: stats.registered,
                    frames,
                    animated,
                }
            }
            Err(e) => {
                warn!("Skipping the rest of {} this cycle: {}", category, e);
                CategoryOutcome::Aborted {
                    downloaded: stats.downloaded,
                    registered: stats.registered,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fetch_new_frames(
        &self,
        category: Category,
        store: &Arc<StdMutex<FrameStore>>,
        stats: &mut CycleStats,
    ) -> Result<()> {
        on_store(store, FrameStore::ensure_indexed).await??;

        let entries = self.source.fetch_metadata(category).await?;
        debug!("{} metadata lists {} entries", category, entries.len());

        let now = Utc::now();
        let window = self.recency_window;
        let wanted = on_store(store, move |store| select_new(store, entries, now, window)).await?;

        for (entry, dest) in wanted {
            let primary = self.source.fetch_tile(&entry.primary).await?;
            let overlay = match &entry.overlay {
                Some(url) => Some(self.source.fetch_tile(url).await?),
                None => None,
            };
            stats.downloaded += 1;

            let compositor = Arc::clone(&self.compositor);
            let time = entry.observed_at;
            let rendered = tokio::task::spawn_blocking(move || {
                compositor.render(&primary, overlay.as_deref(), time, &dest)
            })
            .await?;

            match rendered {
                Ok(Some(path)) => {
                    let evicted = on_store(store, move |store| store.register(path)).await?;
                    stats.registered += 1;
                    if !evicted.is_empty() {
                        debug!("{}: evicted {} old frame(s)", category, evicted.len());
                    }
                }
                Ok(None) => debug!("{} tile for {} is not ready yet", category, time),
                Err(e) => warn!("Failed to render {} frame for {}: {}", category, time, e),
            }
        }
        Ok(())
    }

    async fn rebuild_animation(
        &self,
        category: Category,
        store: &Arc<StdMutex<FrameStore>>,
    ) -> Result<Option<usize>> {
        let (frames, dest) = on_store(store, |store| {
            store
                .ensure_indexed()
                .map(|()| (store.list().to_vec(), store.animation_path()))
        })
        .await??;

        let marker = self.marker().visible_position();
        let bounds = category.bounds();
        let assembler = Arc::clone(&self.assembler);

        let count = tokio::task::spawn_blocking(move || {
            assembler.rebuild(&frames, marker, &bounds, &dest)
        })
        .await??;

        match count {
            Some(n) => debug!("{}: animation rebuilt from {} frame(s)", category, n),
            None => debug!("{}: no frames to animate", category),
        }
        Ok(count)
    }
}

impl<S> fmt::Debug for RadarLoop<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadarLoop")
            .field("storage_root", &self.storage_root)
            .field("recency_window", &self.recency_window)
            .finish_non_exhaustive()
    }
}

/// Run `f` against the frame store on the blocking pool.
async fn on_store<T, F>(store: &Arc<StdMutex<FrameStore>>, f: F) -> Result<T>
where
    F: FnOnce(&mut FrameStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    let out = tokio::task::spawn_blocking(move || {
        let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    })
    .await?;
    Ok(out)
}

/// Pick the metadata entries worth downloading, oldest first.
///
/// An entry qualifies when it is newer than `now - window`, no frame exists
/// for its observation minute yet, and no earlier entry in the same batch
/// claimed that minute.
pub fn select_new(
    store: &FrameStore,
    entries: Vec<TileEntry>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<(TileEntry, PathBuf)> {
    let cutoff = now - window;
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut wanted: Vec<(TileEntry, PathBuf)> = entries
        .into_iter()
        .filter(|entry| entry.observed_at > cutoff)
        .filter_map(|entry| {
            let dest = store.frame_path(entry.observed_at);
            if dest.is_file() || !claimed.insert(dest.clone()) {
                return None;
            }
            Some((entry, dest))
        })
        .collect();
    wanted.sort_by_key(|(entry, _)| entry.observed_at);
    wanted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use chrono::DurationRound;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex as TestMutex;

    /// In-memory tile source that records every request.
    #[derive(Default)]
    struct MockSource {
        metadata: TestMutex<HashMap<Category, Option<Vec<TileEntry>>>>,
        tiles: TestMutex<HashMap<String, Option<Vec<u8>>>>,
        requests: TestMutex<Vec<String>>,
    }

    impl MockSource {
        fn set_metadata(&self, category: Category, entries: Option<Vec<TileEntry>>) {
            self.metadata.lock().unwrap().insert(category, entries);
        }

        fn set_tile(&self, url: &str, bytes: Option<Vec<u8>>) {
            self.tiles.lock().unwrap().insert(url.to_string(), bytes);
        }

        fn tile_requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| !r.starts_with("metadata:"))
                .cloned()
                .collect()
        }

        fn metadata_requests(&self) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.starts_with("metadata:"))
                .count()
        }
    }

    impl TileSource for MockSource {
        async fn fetch_metadata(
            &self,
            category: Category,
        ) -> std::result::Result<Vec<TileEntry>, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push(format!("metadata:{category}"));
            match self.metadata.lock().unwrap().get(&category) {
                Some(Some(entries)) => Ok(entries.clone()),
                Some(None) => Err(FetchError::Status(503)),
                None => Ok(Vec::new()),
            }
        }

        async fn fetch_tile(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.tiles.lock().unwrap().get(url) {
                Some(Some(bytes)) => Ok(bytes.clone()),
                _ => Err(FetchError::Status(404)),
            }
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbaImage::from_pixel(width, height, Rgba([0, 80, 200, 160]))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn base_time() -> DateTime<Utc> {
        (Utc::now() - Duration::hours(2))
            .duration_trunc(Duration::minutes(1))
            .unwrap()
    }

    fn entry(time: DateTime<Utc>, url: &str) -> TileEntry {
        TileEntry {
            observed_at: time,
            primary: url.to_string(),
            overlay: None,
        }
    }

    fn radar(root: &Path) -> RadarLoop<MockSource> {
        RadarLoop::new(
            MockSource::default(),
            RadarConfig {
                storage_root: root.to_path_buf(),
                ..Default::default()
            },
        )
    }

    fn store_for(root: &Path, category: Category) -> FrameStore {
        FrameStore::new(root, category, 18)
    }

    /// Write a small finished frame straight into the store directory.
    fn seed_frame(store: &FrameStore, time: DateTime<Utc>) -> PathBuf {
        store.prepare().unwrap();
        let path = store.frame_path(time);
        RgbaImage::from_pixel(80, 60, Rgba([30, 30, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_select_new_filters_old_present_and_duplicate_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_for(tmp.path(), Category::RainRadar);
        let now = base_time() + Duration::hours(2);
        let present = base_time();
        seed_frame(&store, present);

        let entries = vec![
            entry(base_time() + Duration::minutes(10), "c"),
            entry(now - Duration::hours(13), "old"),
            entry(present, "present"),
            entry(base_time() + Duration::minutes(5), "b"),
            entry(base_time() + Duration::minutes(10), "c-again"),
        ];

        let wanted = select_new(&store, entries, now, Duration::hours(12));
        let urls: Vec<&str> = wanted.iter().map(|(e, _)| e.primary.as_str()).collect();
        assert_eq!(urls, vec!["b", "c"]);
        assert_eq!(
            wanted[1].1,
            store.frame_path(base_time() + Duration::minutes(10))
        );
    }

    #[tokio::test]
    async fn test_inactive_category_is_not_polled() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());

        let report = radar.poll_all().await;
        assert!(report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == CategoryOutcome::Inactive));
        assert_eq!(radar.source.metadata_requests(), 0);
        assert!(radar.last_updated().is_some());
    }

    #[tokio::test]
    async fn test_new_frame_evicts_oldest_and_skips_known() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        let store = store_for(tmp.path(), Category::RainRadar);

        let times: Vec<_> = (1..=19)
            .map(|i| base_time() + Duration::minutes(5 * i))
            .collect();
        let seeded: Vec<_> = times[..18].iter().map(|t| seed_frame(&store, *t)).collect();

        radar.register_category(Category::RainRadar).await.unwrap();
        radar.source.set_metadata(
            Category::RainRadar,
            Some(vec![entry(times[17], "t18"), entry(times[18], "t19")]),
        );
        radar.source.set_tile("t18", Some(png(640, 640)));
        radar.source.set_tile("t19", Some(png(640, 640)));

        let outcome = radar.poll_category(Category::RainRadar).await;
        assert_eq!(
            outcome,
            CategoryOutcome::Updated {
                downloaded: 1,
                registered: 1,
                frames: 18,
                animated: true,
            }
        );
        assert_eq!(radar.source.tile_requests(), vec!["t19".to_string()]);

        let frames = radar.frames(Category::RainRadar).await.unwrap();
        assert_eq!(frames.len(), 18);
        assert_eq!(frames[0], seeded[1]);
        assert_eq!(frames[17], store.frame_path(times[18]));
        assert!(!seeded[0].exists());

        let gif = radar.animated_image(Category::RainRadar).await.unwrap();
        assert!(gif.is_some_and(|bytes| bytes.starts_with(b"GIF89a")));
    }

    #[tokio::test]
    async fn test_entries_outside_recency_window_are_never_fetched() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        radar.register_category(Category::Satellite).await.unwrap();

        let stale = Utc::now() - Duration::hours(13);
        radar
            .source
            .set_metadata(Category::Satellite, Some(vec![entry(stale, "stale")]));
        radar.source.set_tile("stale", Some(png(640, 640)));

        let outcome = radar.poll_category(Category::Satellite).await;
        assert_eq!(
            outcome,
            CategoryOutcome::Updated {
                downloaded: 0,
                registered: 0,
                frames: 0,
                animated: false,
            }
        );
        assert!(radar.source.tile_requests().is_empty());
        assert_eq!(radar.animated_image(Category::Satellite).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undersized_tile_is_retried_next_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        radar.register_category(Category::Thunder).await.unwrap();

        let time = base_time();
        radar.source.set_metadata(
            Category::Thunder,
            Some(vec![entry(time, "small"), entry(time, "small-dup")]),
        );
        radar.source.set_tile("small", Some(png(256, 256)));

        let outcome = radar.poll_category(Category::Thunder).await;
        assert!(matches!(
            outcome,
            CategoryOutcome::Updated {
                downloaded: 1,
                registered: 0,
                ..
            }
        ));
        assert!(!store_for(tmp.path(), Category::Thunder).has_frame(time));

        radar.poll_category(Category::Thunder).await;
        assert_eq!(
            radar.source.tile_requests(),
            vec!["small".to_string(), "small".to_string()]
        );
    }

    #[tokio::test]
    async fn test_tile_failure_aborts_category_only() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        radar.register_category(Category::RainRadar).await.unwrap();
        radar.register_category(Category::Hail).await.unwrap();

        let time = base_time();
        radar.source.set_metadata(
            Category::RainRadar,
            Some(vec![
                entry(time, "missing"),
                entry(time + Duration::minutes(5), "never"),
            ]),
        );
        radar.source.set_metadata(Category::Hail, None);

        let report = radar.poll_all().await;
        assert!(matches!(
            report.outcome(Category::RainRadar),
            Some(CategoryOutcome::Aborted { downloaded: 0, .. })
        ));
        assert!(matches!(
            report.outcome(Category::Hail),
            Some(CategoryOutcome::Aborted { .. })
        ));
        assert_eq!(radar.source.tile_requests(), vec!["missing".to_string()]);
        assert!(!store_for(tmp.path(), Category::RainRadar).has_frame(time));
        assert_eq!(radar.animated_image(Category::RainRadar).await.unwrap(), None);
        assert_eq!(radar.last_updated(), Some(report.finished_at));
    }

    #[tokio::test]
    async fn test_consumer_counting_and_reclaim() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        let store = store_for(tmp.path(), Category::Hail);

        radar.register_category(Category::Hail).await.unwrap();
        radar.register_category(Category::Hail).await.unwrap();
        assert!(store.dir().is_dir());
        seed_frame(&store, base_time());

        radar.deregister_category(Category::Hail).await.unwrap();
        assert!(radar.is_active(Category::Hail).await);
        assert!(store.dir().is_dir());

        radar.deregister_category(Category::Hail).await.unwrap();
        assert!(!radar.is_active(Category::Hail).await);
        assert!(!store.dir().exists());

        // Extra deregistration is harmless.
        radar.deregister_category(Category::Hail).await.unwrap();
    }

    #[tokio::test]
    async fn test_force_refresh_rebuilds_without_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        let store = store_for(tmp.path(), Category::DrizzleSnow);
        for i in 0..3 {
            seed_frame(&store, base_time() + Duration::minutes(5 * i));
        }

        assert!(radar.force_refresh().await.is_empty());
        radar.register_category(Category::DrizzleSnow).await.unwrap();
        assert_eq!(radar.animated_image(Category::DrizzleSnow).await.unwrap(), None);

        radar.set_marker_location(Some(52.0), Some(5.0)).unwrap();
        let results = radar.force_refresh().await;
        assert_eq!(results, vec![(Category::DrizzleSnow, Some(3))]);
        assert!(radar
            .animated_image(Category::DrizzleSnow)
            .await
            .unwrap()
            .is_some());
        assert_eq!(radar.source.metadata_requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_store_produces_no_animation() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        radar.register_category(Category::RadarSatellite).await.unwrap();

        assert_eq!(
            radar.rebuild_category(Category::RadarSatellite).await.unwrap(),
            None
        );
        assert!(!radar.animation_path(Category::RadarSatellite).exists());
    }

    #[tokio::test]
    async fn test_reindex_picks_up_external_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        let store = store_for(tmp.path(), Category::RainRadar);
        radar.register_category(Category::RainRadar).await.unwrap();
        assert!(radar.frames(Category::RainRadar).await.unwrap().is_empty());

        seed_frame(&store, base_time());
        assert!(radar.frames(Category::RainRadar).await.unwrap().is_empty());
        assert_eq!(radar.reindex(Category::RainRadar).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_frames_of_inactive_category_leave_disk_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());
        let store = store_for(tmp.path(), Category::Thunder);
        let seeded: Vec<_> = (0..20)
            .map(|i| seed_frame(&store, base_time() + Duration::minutes(5 * i)))
            .collect();

        assert!(radar.frames(Category::Thunder).await.unwrap().is_empty());
        assert!(seeded.iter().all(|path| path.exists()));

        radar.register_category(Category::Thunder).await.unwrap();
        assert_eq!(radar.frames(Category::Thunder).await.unwrap().len(), 18);
        assert!(!seeded[0].exists());
    }

    #[test]
    fn test_marker_updates_are_validated() {
        let tmp = tempfile::tempdir().unwrap();
        let radar = radar(tmp.path());

        assert!(radar.set_marker_location(None, None).is_err());
        assert!(radar.set_marker_location(Some(95.0), None).is_err());
        assert_eq!(radar.marker(), MarkerSetting::default());

        radar.set_marker_location(Some(52.1), None).unwrap();
        radar.set_marker_location(None, Some(5.2)).unwrap();
        assert_eq!(radar.marker().visible_position(), Some((52.1, 5.2)));

        radar.set_show_marker(false);
        assert_eq!(radar.marker().visible_position(), None);
        assert_eq!(radar.marker().latitude, Some(52.1));
    }
}
