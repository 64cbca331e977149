// Lightning map service - per-instance state, tick pipeline and read path
use crate::application::ingest::{FetchWindow, RetryPolicy, StrikeSource, fetch_with_retry};
use crate::application::settings_store::SettingsStore;
use crate::application::timeline::Timeline;
use crate::domain::geo::MapBoundingBox;
use crate::domain::settings::{MarkerSettings, SettingsUpdate};
use crate::domain::tick::TickKey;
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::rendering::animation::AnimationAssembler;
use crate::rendering::frame::FrameRenderer;
use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bbox: MapBoundingBox,
    pub retry: RetryPolicy,
    pub window_minutes: i64,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The instance is not active; nothing was fetched or written.
    Inactive,
    Completed {
        key: TickKey,
        strikes: usize,
        evicted: usize,
        tracked: usize,
    },
}

struct InstanceState {
    timeline: Timeline,
    active: bool,
    settings: MarkerSettings,
    animation: Option<Bytes>,
}

struct Inner {
    source: Arc<dyn StrikeSource>,
    store: ArtifactStore,
    settings_store: Arc<dyn SettingsStore>,
    renderer: FrameRenderer,
    assembler: AnimationAssembler,
    pipeline: PipelineSettings,
    state: Mutex<InstanceState>,
    tick_lock: tokio::sync::Mutex<()>,
}

/// One deployment of the lightning map. Ticks are serialized; the read
/// path only takes the state lock briefly and never waits on rendering.
#[derive(Clone)]
pub struct LightningService {
    inner: Arc<Inner>,
}

impl LightningService {
    pub fn new(
        source: Arc<dyn StrikeSource>,
        store: ArtifactStore,
        settings_store: Arc<dyn SettingsStore>,
        renderer: FrameRenderer,
        assembler: AnimationAssembler,
        pipeline: PipelineSettings,
        default_settings: MarkerSettings,
    ) -> anyhow::Result<Self> {
        let settings = settings_store
            .load()
            .context("load stored settings")?
            .unwrap_or(default_settings);

        let state = InstanceState {
            timeline: Timeline::new(pipeline.capacity),
            active: false,
            settings,
            animation: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                store,
                settings_store,
                renderer,
                assembler,
                pipeline,
                state: Mutex::new(state),
                tick_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Prepare storage, rebuild the timeline from stored frames and start
    /// accepting ticks.
    pub async fn activate(&self) -> anyhow::Result<()> {
        let _tick = self.inner.tick_lock.lock().await;
        let inner = self.inner.clone();
        let (timeline, animation) = tokio::task::spawn_blocking(move || {
            inner.store.ensure_dir()?;
            let timeline = Timeline::rebuild(&inner.store, inner.pipeline.capacity)?;
            let animation = inner.store.read_animation()?;
            anyhow::Ok((timeline, animation))
        })
        .await
        .context("activation worker failed")??;

        let mut state = self.inner.lock_state();
        state.timeline = timeline;
        state.animation = animation.map(Bytes::from);
        state.active = true;
        tracing::info!(
            "Activated lightning map at {} ({} ticks tracked, latest {:?})",
            self.inner.store.root().display(),
            state.timeline.len(),
            state.timeline.latest().map(|key| key.to_string())
        );
        Ok(())
    }

    /// Stop accepting ticks. With `purge`, every tick artifact and the
    /// animation are removed; settings are kept.
    pub async fn deactivate(&self, purge: bool) -> anyhow::Result<()> {
        let _tick = self.inner.tick_lock.lock().await;
        {
            let mut state = self.inner.lock_state();
            state.active = false;
            state.timeline.clear();
            state.animation = None;
        }

        if purge {
            let inner = self.inner.clone();
            let removed = tokio::task::spawn_blocking(move || inner.store.purge())
                .await
                .context("purge worker failed")??;
            tracing::info!("Deactivated lightning map, removed {} artifacts", removed);
        } else {
            tracing::info!("Deactivated lightning map");
        }
        Ok(())
    }

    pub async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        self.run_tick_at(Local::now()).await
    }

    /// Fetch, store, render, retain and re-assemble for the tick at `now`.
    pub async fn run_tick_at(&self, now: DateTime<Local>) -> anyhow::Result<TickOutcome> {
        let _tick = self.inner.tick_lock.lock().await;
        if !self.is_active() {
            tracing::debug!("Skipping tick, lightning map is not active");
            return Ok(TickOutcome::Inactive);
        }

        let key = TickKey::from_local(now);
        let now_utc = now.with_timezone(&Utc);
        let pipeline = &self.inner.pipeline;
        let window = FetchWindow::trailing(pipeline.bbox, now_utc, pipeline.window_minutes);
        let body = fetch_with_retry(self.inner.source.as_ref(), &window, &pipeline.retry).await;

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.process_tick(key, &body, now_utc))
            .await
            .context("tick worker failed")?
    }

    /// Rebuild the animation from the current timeline without a new tick.
    /// Returns false when the instance is inactive.
    pub async fn refresh(&self) -> anyhow::Result<bool> {
        let _tick = self.inner.tick_lock.lock().await;
        self.reassemble_locked().await
    }

    /// Caller holds the tick lock.
    async fn reassemble_locked(&self) -> anyhow::Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.reassemble())
            .await
            .context("refresh worker failed")??;
        Ok(true)
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock_state().active
    }

    /// Latest assembled animation, if any.
    pub fn animation(&self) -> Option<Bytes> {
        self.inner.lock_state().animation.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().settings.last_updated
    }

    pub fn settings(&self) -> MarkerSettings {
        self.inner.lock_state().settings.clone()
    }

    pub fn timeline(&self) -> Vec<TickKey> {
        self.inner.lock_state().timeline.keys()
    }

    /// Apply and persist a settings change, then refresh the animation so
    /// the new overlays show up without waiting for the next tick.
    /// Validation failures surface as `SettingsError`.
    pub async fn update_settings(&self, update: SettingsUpdate) -> anyhow::Result<MarkerSettings> {
        // Held across apply and save so a finishing tick cannot interleave
        // its own settings write.
        let _tick = self.inner.tick_lock.lock().await;
        let updated = {
            let mut state = self.inner.lock_state();
            let mut next = state.settings.clone();
            next.apply(&update)?;
            state.settings = next.clone();
            next
        };

        let inner = self.inner.clone();
        let to_save = updated.clone();
        tokio::task::spawn_blocking(move || inner.settings_store.save(&to_save))
            .await
            .context("settings worker failed")??;
        tracing::info!("Settings updated: {:?}", update);

        self.reassemble_locked().await?;
        Ok(updated)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_tick(
        &self,
        key: TickKey,
        body: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TickOutcome> {
        self.store.write_raw(key, body)?;
        let rendered = self.renderer.render_tick(&self.store, key, now)?;

        let evicted = self.lock_state().timeline.register(key);
        Timeline::discard(&self.store, &evicted);

        let tracked = self.reassemble()?;

        let settings = {
            let mut state = self.lock_state();
            state.settings.last_updated = Some(Utc::now());
            state.settings.clone()
        };
        self.settings_store
            .save(&settings)
            .context("persist last updated")?;

        tracing::info!(
            "Tick {} complete: {} strikes drawn, {} evicted, {} frames tracked",
            key,
            rendered.plotted,
            evicted.len(),
            tracked
        );
        Ok(TickOutcome::Completed {
            key,
            strikes: rendered.plotted,
            evicted: evicted.len(),
            tracked,
        })
    }

    /// Assemble the animation from a snapshot of the timeline and settings
    /// and publish it to readers. Returns the number of tracked ticks.
    fn reassemble(&self) -> anyhow::Result<usize> {
        let (keys, settings) = {
            let state = self.lock_state();
            (state.timeline.keys(), state.settings.clone())
        };

        if let Some(bytes) = self.assembler.assemble(&self.store, &keys, &settings)? {
            self.lock_state().animation = Some(Bytes::from(bytes));
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ingest::FetchError;
    use crate::domain::activity::AgeBucket;
    use crate::domain::settings::SettingsError;
    use crate::rendering::assets::MapAssets;
    use crate::rendering::overlay::OverlayComposer;
    use crate::rendering::svg::SvgRasterizer;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    const WIDTH: u32 = 200;
    const HEIGHT: u32 = 180;

    fn bbox() -> MapBoundingBox {
        MapBoundingBox::new(0.0, 20.0, 55.0, 45.0)
    }

    fn points() -> [(f64, f64); 3] {
        [(52.0, 5.0), (50.0, 10.0), (48.0, 15.0)]
    }

    /// Serves three fresh strikes relative to the requested window.
    struct FreshStrikes {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StrikeSource for FreshStrikes {
        async fn fetch_strikes(&self, window: &FetchWindow) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Strikes two minutes into the five minute window.
            let time = window.since_ns + 2 * 60 * 1_000_000_000;
            Ok(points()
                .iter()
                .map(|(lat, lon)| format!("{{\"time\":{time},\"lat\":{lat},\"lon\":{lon}}}\n"))
                .collect())
        }

        async fn check_connection(&self) -> Result<(), FetchError> {
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl StrikeSource for Unreachable {
        async fn fetch_strikes(&self, _window: &FetchWindow) -> Result<String, FetchError> {
            Err(FetchError::Timeout)
        }

        async fn check_connection(&self) -> Result<(), FetchError> {
            Err(FetchError::Timeout)
        }
    }

    /// Holds every fetch until released.
    #[derive(Default)]
    struct GatedFeed {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl StrikeSource for GatedFeed {
        async fn fetch_strikes(&self, _window: &FetchWindow) -> Result<String, FetchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(String::new())
        }

        async fn check_connection(&self) -> Result<(), FetchError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySettings {
        saved: Mutex<Option<MarkerSettings>>,
    }

    impl SettingsStore for MemorySettings {
        fn load(&self) -> anyhow::Result<Option<MarkerSettings>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save(&self, settings: &MarkerSettings) -> anyhow::Result<()> {
            *self.saved.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    fn plain_settings() -> MarkerSettings {
        MarkerSettings {
            show_marker: false,
            show_legend: false,
            show_activity_graph: false,
            ..Default::default()
        }
    }

    fn service_with(
        dir: &TempDir,
        source: Arc<dyn StrikeSource>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> LightningService {
        let svg = SvgRasterizer::without_fonts();
        let assets = Arc::new(MapAssets::generated(WIDTH, HEIGHT, &svg).unwrap());
        let renderer = FrameRenderer::new(assets.clone(), bbox(), svg.clone());
        let assembler = AnimationAssembler::new(OverlayComposer::new(assets, bbox(), svg));
        let pipeline = PipelineSettings {
            bbox: bbox(),
            retry: RetryPolicy {
                attempts: 2,
                timeout: StdDuration::from_secs(5),
                backoff: StdDuration::from_millis(1),
            },
            window_minutes: 5,
            capacity: 18,
        };
        LightningService::new(
            source,
            ArtifactStore::new(dir.path().join("instance")),
            settings_store,
            renderer,
            assembler,
            pipeline,
            plain_settings(),
        )
        .unwrap()
    }

    fn service(dir: &TempDir) -> LightningService {
        service_with(
            dir,
            Arc::new(FreshStrikes {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(MemorySettings::default()),
        )
    }

    fn at(minute_offset: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 7, 15, 16, 0, 0).unwrap() + Duration::minutes(minute_offset)
    }

    fn frame_count(bytes: &[u8]) -> usize {
        GifDecoder::new(Cursor::new(bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_inactive_tick_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FreshStrikes {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(&dir, source.clone(), Arc::new(MemorySettings::default()));

        assert_eq!(service.run_tick_at(at(0)).await.unwrap(), TickOutcome::Inactive);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("instance").exists());
        assert!(service.animation().is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_tick() {
        let dir = TempDir::new().unwrap();
        let settings_store = Arc::new(MemorySettings::default());
        let service = service_with(
            &dir,
            Arc::new(FreshStrikes {
                calls: AtomicUsize::new(0),
            }),
            settings_store.clone(),
        );
        service.activate().await.unwrap();

        let outcome = service.run_tick_at(at(0)).await.unwrap();
        let key = TickKey::from_local(at(0));
        assert_eq!(
            outcome,
            TickOutcome::Completed {
                key,
                strikes: 3,
                evicted: 0,
                tracked: 1
            }
        );

        let store = ArtifactStore::new(dir.path().join("instance"));
        let histogram = store.load_activity(key).unwrap().unwrap();
        assert_eq!(histogram.count(AgeBucket::Min0), 3);
        assert_eq!(histogram.total(), 3);

        let frame = store.load_frame(key).unwrap().unwrap();
        for (lat, lon) in points() {
            let (x, y) = bbox().project(lat, lon, WIDTH);
            assert_eq!(frame.get_pixel(x as u32, y as u32), &Rgba([255, 255, 255, 255]));
        }

        assert_eq!(service.timeline().last(), Some(&key));
        let animation = service.animation().unwrap();
        assert_eq!(frame_count(&animation), 1);
        assert_eq!(store.read_animation().unwrap().as_deref(), Some(&animation[..]));

        assert!(service.last_updated().is_some());
        let saved = settings_store.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.last_updated, service.last_updated());
    }

    #[tokio::test]
    async fn test_failed_fetch_still_produces_a_frame() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, Arc::new(Unreachable), Arc::new(MemorySettings::default()));
        service.activate().await.unwrap();

        let outcome = service.run_tick_at(at(0)).await.unwrap();
        let key = TickKey::from_local(at(0));
        assert!(matches!(outcome, TickOutcome::Completed { strikes: 0, .. }));

        let store = ArtifactStore::new(dir.path().join("instance"));
        assert_eq!(store.read_raw(key).unwrap().as_deref(), Some(""));
        assert_eq!(store.tick(key).artifact_count(), 3);
        assert!(store.load_activity(key).unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_over_many_ticks() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.activate().await.unwrap();

        for n in 0..20 {
            service.run_tick_at(at(n * 5)).await.unwrap();
        }

        let expected: Vec<TickKey> = (2..20).map(|n| TickKey::from_local(at(n * 5))).collect();
        assert_eq!(service.timeline(), expected);

        let store = ArtifactStore::new(dir.path().join("instance"));
        for n in 0..2 {
            assert_eq!(store.tick(TickKey::from_local(at(n * 5))).artifact_count(), 0);
        }
        for key in &expected {
            assert_eq!(store.tick(*key).artifact_count(), 3);
        }

        let bytes = service.animation().unwrap();
        let frames = GifDecoder::new(Cursor::new(&bytes[..]))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 18);
        assert_eq!(
            StdDuration::from(frames[17].delay()),
            StdDuration::from_millis(2000)
        );
        assert_eq!(
            StdDuration::from(frames[0].delay()),
            StdDuration::from_millis(200)
        );
    }

    #[tokio::test]
    async fn test_reactivation_rebuilds_timeline_from_disk() {
        let dir = TempDir::new().unwrap();
        let first = service(&dir);
        first.activate().await.unwrap();
        first.run_tick_at(at(0)).await.unwrap();
        first.run_tick_at(at(5)).await.unwrap();

        let second = service(&dir);
        assert!(second.animation().is_none());
        second.activate().await.unwrap();
        assert_eq!(second.timeline(), first.timeline());
        assert!(second.animation().is_some());
    }

    #[tokio::test]
    async fn test_update_settings_validates_and_persists() {
        let dir = TempDir::new().unwrap();
        let settings_store = Arc::new(MemorySettings::default());
        let service = service_with(
            &dir,
            Arc::new(FreshStrikes {
                calls: AtomicUsize::new(0),
            }),
            settings_store.clone(),
        );
        service.activate().await.unwrap();
        service.run_tick_at(at(0)).await.unwrap();
        let before = service.animation().unwrap();

        let err = service
            .update_settings(SettingsUpdate {
                marker_lat: Some(123.0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SettingsError>(),
            Some(&SettingsError::Latitude(123.0))
        );

        let updated = service
            .update_settings(SettingsUpdate {
                show_legend: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(updated.show_legend);
        assert!(service.settings().show_legend);
        assert!(settings_store.saved.lock().unwrap().as_ref().unwrap().show_legend);
        assert_ne!(service.animation().unwrap(), before);
    }

    #[tokio::test]
    async fn test_settings_update_waits_for_running_tick() {
        let dir = TempDir::new().unwrap();
        let feed = Arc::new(GatedFeed::default());
        let settings_store = Arc::new(MemorySettings::default());
        let service = service_with(&dir, feed.clone(), settings_store.clone());
        service.activate().await.unwrap();

        let ticking = tokio::spawn({
            let service = service.clone();
            async move { service.run_tick_at(at(0)).await }
        });
        feed.started.notified().await;

        let update = service.update_settings(SettingsUpdate {
            show_legend: Some(true),
            ..Default::default()
        });
        tokio::pin!(update);
        assert!(
            tokio::time::timeout(StdDuration::from_millis(50), &mut update)
                .await
                .is_err()
        );

        feed.release.notify_one();
        ticking.await.unwrap().unwrap();
        let updated = update.await.unwrap();

        assert!(updated.show_legend);
        assert!(updated.last_updated.is_some());
        assert_eq!(updated.last_updated, service.last_updated());
        let saved = settings_store.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved, service.settings());
    }

    #[tokio::test]
    async fn test_stored_settings_override_defaults() {
        let dir = TempDir::new().unwrap();
        let stored = MarkerSettings {
            marker_lat: Some(1.0),
            marker_lon: Some(2.0),
            ..Default::default()
        };
        let settings_store = Arc::new(MemorySettings {
            saved: Mutex::new(Some(stored.clone())),
        });
        let service = service_with(&dir, Arc::new(Unreachable), settings_store);
        assert_eq!(service.settings(), stored);
    }

    #[tokio::test]
    async fn test_deactivate_with_purge() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.activate().await.unwrap();
        service.run_tick_at(at(0)).await.unwrap();

        service.deactivate(true).await.unwrap();
        assert!(!service.is_active());
        assert!(service.animation().is_none());
        assert!(service.timeline().is_empty());
        assert!(!service.refresh().await.unwrap());

        let store = ArtifactStore::new(dir.path().join("instance"));
        assert_eq!(store.tick(TickKey::from_local(at(0))).artifact_count(), 0);
        assert_eq!(store.read_animation().unwrap(), None);
        assert_eq!(service.run_tick_at(at(5)).await.unwrap(), TickOutcome::Inactive);
    }
}
