// Per-instance artifact directory - raw strike data, frames, histograms, animation
use crate::domain::activity::ActivityHistogram;
use crate::domain::tick::{ArtifactKind, CaptureTick, TickKey};
use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const ANIMATION_FILE: &str = "animated.gif";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create artifact directory {}", self.root.display()))
    }

    pub fn path_for(&self, key: TickKey, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name(key))
    }

    pub fn animation_path(&self) -> PathBuf {
        self.root.join(ANIMATION_FILE)
    }

    /// The tick for `key` with whichever artifacts currently exist.
    pub fn tick(&self, key: TickKey) -> CaptureTick {
        let existing = |kind| {
            let path = self.path_for(key, kind);
            path.is_file().then_some(path)
        };
        CaptureTick {
            key,
            raw_data: existing(ArtifactKind::RawData),
            frame: existing(ArtifactKind::Frame),
            activity: existing(ArtifactKind::Activity),
        }
    }

    /// Write the tick's raw feed body, replacing any earlier body for the key.
    pub fn write_raw(&self, key: TickKey, body: &str) -> Result<PathBuf> {
        let path = self.path_for(key, ArtifactKind::RawData);
        fs::write(&path, body).with_context(|| format!("write raw data {}", path.display()))?;
        tracing::debug!("Stored {} bytes of raw data at {}", body.len(), path.display());
        Ok(path)
    }

    pub fn read_raw(&self, key: TickKey) -> Result<Option<String>> {
        let path = self.path_for(key, ArtifactKind::RawData);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read raw data {}", path.display())),
        }
    }

    /// Persist a base frame as PNG and stamp its mtime with the tick's time.
    pub fn write_frame(&self, key: TickKey, frame: &RgbaImage) -> Result<PathBuf> {
        let path = self.path_for(key, ArtifactKind::Frame);
        frame
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write frame {}", path.display()))?;

        let file = fs::File::options()
            .write(true)
            .open(&path)
            .with_context(|| format!("open frame {} to set mtime", path.display()))?;
        file.set_modified(key.system_time())
            .with_context(|| format!("set mtime on {}", path.display()))?;
        Ok(path)
    }

    pub fn load_frame(&self, key: TickKey) -> Result<Option<RgbaImage>> {
        let path = self.path_for(key, ArtifactKind::Frame);
        if !path.is_file() {
            return Ok(None);
        }
        let frame = image::open(&path)
            .with_context(|| format!("decode frame {}", path.display()))?
            .to_rgba8();
        Ok(Some(frame))
    }

    pub fn write_activity(&self, key: TickKey, histogram: &ActivityHistogram) -> Result<PathBuf> {
        let path = self.path_for(key, ArtifactKind::Activity);
        let json = serde_json::to_vec(histogram).context("encode activity histogram")?;
        fs::write(&path, json).with_context(|| format!("write activity {}", path.display()))?;
        Ok(path)
    }

    pub fn load_activity(&self, key: TickKey) -> Result<Option<ActivityHistogram>> {
        let path = self.path_for(key, ArtifactKind::Activity);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read activity {}", path.display())),
        };
        let histogram = serde_json::from_slice(&bytes)
            .with_context(|| format!("decode activity {}", path.display()))?;
        Ok(Some(histogram))
    }

    /// Keys of every stored artifact of `kind`, oldest first.
    pub fn list_keys(&self, kind: ArtifactKind) -> Result<Vec<TickKey>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("list {}", self.root.display()));
            }
        };

        let mut keys: Vec<TickKey> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(kind.extension()) {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(TickKey::parse)
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Remove every artifact of a tick. Best-effort: missing files are
    /// skipped and failures are only logged. Returns how many were removed.
    pub fn delete_tick(&self, key: TickKey) -> usize {
        let mut removed = 0;
        for kind in ArtifactKind::ALL {
            let path = self.path_for(key, kind);
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!("Removed {}", path.display());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Replace the served animation. Written to a sibling file first so a
    /// reader never sees a half-written GIF.
    pub fn write_animation(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.animation_path();
        let staging = self.root.join(format!("{ANIMATION_FILE}.tmp"));
        fs::write(&staging, bytes)
            .with_context(|| format!("write animation {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("replace animation {}", path.display()))?;
        Ok(path)
    }

    pub fn read_animation(&self) -> Result<Option<Vec<u8>>> {
        let path = self.animation_path();
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read animation {}", path.display())),
        }
    }

    /// Remove every tick artifact and the animation; other files are kept.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        let mut keys = Vec::new();
        for kind in ArtifactKind::ALL {
            keys.extend(self.list_keys(kind)?);
        }
        keys.sort();
        keys.dedup();
        for key in keys {
            removed += self.delete_tick(key);
        }
        match fs::remove_file(self.animation_path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("remove animation"),
        }
        Ok(removed)
    }
}
