// Age buckets, the color-by-age policy and the per-tick activity histogram
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Age band of a strike, named by its lower bound in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeBucket {
    Min0,
    Min20,
    Min40,
    Min60,
    Min80,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 5] = [
        AgeBucket::Min0,
        AgeBucket::Min20,
        AgeBucket::Min40,
        AgeBucket::Min60,
        AgeBucket::Min80,
    ];

    /// Bucket for a strike `age_seconds` old. Anything from 80 minutes on
    /// shares the last bucket; negative ages (clock skew) count as fresh.
    pub fn classify(age_seconds: i64) -> Self {
        match age_seconds.max(0) / 60 {
            0..20 => AgeBucket::Min0,
            20..40 => AgeBucket::Min20,
            40..60 => AgeBucket::Min40,
            60..80 => AgeBucket::Min60,
            _ => AgeBucket::Min80,
        }
    }

    pub fn lower_bound_minutes(self) -> u32 {
        match self {
            AgeBucket::Min0 => 0,
            AgeBucket::Min20 => 20,
            AgeBucket::Min40 => 40,
            AgeBucket::Min60 => 60,
            AgeBucket::Min80 => 80,
        }
    }

    pub fn from_lower_bound(minutes: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.lower_bound_minutes() == minutes)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Marker color for strikes in this bucket.
    pub fn color(self) -> [u8; 3] {
        match self {
            AgeBucket::Min0 => [255, 255, 255],
            AgeBucket::Min20 => [255, 255, 0],
            AgeBucket::Min40 => [255, 170, 0],
            AgeBucket::Min60 => [255, 85, 0],
            AgeBucket::Min80 => [255, 0, 0],
        }
    }
}

/// Strike counts per age bucket for one tick.
///
/// Persisted as a JSON object keyed by the bucket's lower bound in minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<u32, u64>", try_from = "BTreeMap<u32, u64>")]
pub struct ActivityHistogram {
    counts: [u64; 5],
}

impl ActivityHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, bucket: AgeBucket) {
        self.counts[bucket.index()] += 1;
    }

    pub fn count(&self, bucket: AgeBucket) -> u64 {
        self.counts[bucket.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// The bucket with the most strikes and its count. Ties go to the
    /// freshest bucket. `None` when the histogram is empty.
    pub fn peak(&self) -> Option<(AgeBucket, u64)> {
        AgeBucket::ALL
            .into_iter()
            .map(|bucket| (bucket, self.count(bucket)))
            .filter(|(_, count)| *count > 0)
            .fold(None, |best, (bucket, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((bucket, count)),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgeBucket, u64)> + '_ {
        AgeBucket::ALL
            .into_iter()
            .map(|bucket| (bucket, self.count(bucket)))
    }
}

impl From<ActivityHistogram> for BTreeMap<u32, u64> {
    fn from(histogram: ActivityHistogram) -> Self {
        histogram
            .iter()
            .map(|(bucket, count)| (bucket.lower_bound_minutes(), count))
            .collect()
    }
}

impl TryFrom<BTreeMap<u32, u64>> for ActivityHistogram {
    type Error = String;

    fn try_from(map: BTreeMap<u32, u64>) -> Result<Self, Self::Error> {
        let mut histogram = ActivityHistogram::new();
        for (minutes, count) in map {
            let bucket = AgeBucket::from_lower_bound(minutes)
                .ok_or_else(|| format!("unknown age bucket: {minutes}"))?;
            histogram.counts[bucket.index()] = count;
        }
        Ok(histogram)
    }
}
