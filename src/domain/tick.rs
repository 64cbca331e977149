// Capture ticks - minute-resolution keys and the artifacts they own
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

const KEY_FORMAT: &str = "%Y%m%d-%H%M";
const KEY_LEN: usize = 13;

/// Local capture time truncated to the minute.
///
/// The textual form `YYYYMMDD-HHMM` is fixed width, so ordering the strings
/// and ordering the keys give the same chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickKey(NaiveDateTime);

impl TickKey {
    pub fn from_naive(time: NaiveDateTime) -> Self {
        let truncated = time
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(time);
        Self(truncated)
    }

    pub fn from_local(time: DateTime<Local>) -> Self {
        Self::from_naive(time.naive_local())
    }

    pub fn parse(text: &str) -> Option<Self> {
        if text.len() != KEY_LEN {
            return None;
        }
        NaiveDateTime::parse_from_str(text, KEY_FORMAT)
            .ok()
            .map(Self)
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// `HH:MM` label drawn on the frame.
    pub fn clock_label(&self) -> String {
        self.0.format("%H:%M").to_string()
    }

    /// Wall-clock instant of the key, used as the frame's modification time.
    pub fn system_time(&self) -> SystemTime {
        let utc = Local
            .from_local_datetime(&self.0)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&self.0));
        SystemTime::from(utc)
    }
}

impl fmt::Display for TickKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(KEY_FORMAT))
    }
}

/// The three per-tick artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    RawData,
    Frame,
    Activity,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::RawData,
        ArtifactKind::Frame,
        ArtifactKind::Activity,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::RawData => "data",
            ArtifactKind::Frame => "png",
            ArtifactKind::Activity => "activity",
        }
    }

    pub fn file_name(self, key: TickKey) -> String {
        format!("{}.{}", key, self.extension())
    }
}

/// One tick and whichever of its artifacts currently exist on storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTick {
    pub key: TickKey,
    pub raw_data: Option<PathBuf>,
    pub frame: Option<PathBuf>,
    pub activity: Option<PathBuf>,
}

impl CaptureTick {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&PathBuf> {
        match kind {
            ArtifactKind::RawData => self.raw_data.as_ref(),
            ArtifactKind::Frame => self.frame.as_ref(),
            ArtifactKind::Activity => self.activity.as_ref(),
        }
    }

    pub fn artifact_count(&self) -> usize {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.artifact(*kind).is_some())
            .count()
    }
}
