// Animation assembly - looping GIF of every tracked frame
use crate::domain::settings::MarkerSettings;
use crate::domain::tick::TickKey;
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::rendering::overlay::OverlayComposer;
use anyhow::{Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};

pub const FRAME_DELAY_MS: u32 = 200;
pub const FINAL_FRAME_DELAY_MS: u32 = 2000;
const GIF_SPEED: i32 = 10;

/// Display time of each of `count` frames; the last one lingers.
pub fn frame_durations(count: usize) -> Vec<u32> {
    (0..count)
        .map(|index| {
            if index + 1 == count {
                FINAL_FRAME_DELAY_MS
            } else {
                FRAME_DELAY_MS
            }
        })
        .collect()
}

/// Encode frames as an infinitely looping GIF.
pub fn encode_gif(frames: Vec<RgbaImage>) -> Result<Vec<u8>> {
    let durations = frame_durations(frames.len());
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buffer, GIF_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("set gif loop")?;
        let frames = frames.into_iter().zip(durations).map(|(image, ms)| {
            Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(ms, 1))
        });
        encoder.encode_frames(frames).context("encode gif frames")?;
    }
    Ok(buffer)
}

pub struct AnimationAssembler {
    composer: OverlayComposer,
}

impl AnimationAssembler {
    pub fn new(composer: OverlayComposer) -> Self {
        Self { composer }
    }

    /// Compose every tick whose frame still exists, encode them in order and
    /// replace the stored animation. Returns `None` (and leaves any previous
    /// animation alone) when no frame is left.
    pub fn assemble(
        &self,
        store: &ArtifactStore,
        keys: &[TickKey],
        settings: &MarkerSettings,
    ) -> Result<Option<Vec<u8>>> {
        let mut frames = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(frame) = self.composer.compose_tick(store, *key, settings)? {
                frames.push(frame);
            }
        }

        if frames.is_empty() {
            tracing::debug!("No frames to animate");
            return Ok(None);
        }

        let count = frames.len();
        let bytes = encode_gif(frames)?;
        store.write_animation(&bytes)?;
        tracing::debug!("Assembled animation of {} frames ({} bytes)", count, bytes.len());
        Ok(Some(bytes))
    }
}
