use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::Instant;

use crate::archive::{Archive, Row};
use crate::domain::{Sample, DATE_FORMAT, TIME_FORMAT};
use crate::error::ArchiveError;

/// samples accumulated since the last archive file
///
/// rotates once `period` has passed since the previous flush, and once more
/// at shutdown whatever the age. a failed flush keeps the samples so the next
/// attempt still has them.
pub struct RotationBuffer {
    samples: Vec<Sample>,
    period: Duration,
    last_flush: Instant,
}

impl RotationBuffer {
    pub fn new(period: Duration, started: Instant) -> Self {
        Self {
            samples: Vec::new(),
            period,
            last_flush: started,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn should_flush(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.period
    }

    /// `{firstDate}_{firstTime}-to-{lastDate}_{lastTime}` with `:` made file-safe
    ///
    /// an empty buffer is named after `flushed_at` on both ends.
    pub fn file_stem(&self, flushed_at: NaiveDateTime) -> String {
        let first = self.samples.first().map_or(flushed_at, |s| s.taken_at);
        let last = self.samples.last().map_or(flushed_at, |s| s.taken_at);
        let stamp = |at: NaiveDateTime| {
            format!("{}_{}", at.format(DATE_FORMAT), at.format(TIME_FORMAT))
        };
        format!("{}-to-{}", stamp(first), stamp(last)).replace(':', ".")
    }

    /// write everything out and start over
    pub async fn flush(
        &mut self,
        archive: &mut dyn Archive,
        now: Instant,
        wall_clock: NaiveDateTime,
    ) -> Result<PathBuf, ArchiveError> {
        let stem = self.file_stem(wall_clock);
        let rows: Vec<Row> = self.samples.iter().map(Sample::to_row).collect();

        let path = archive.write_table(&stem, &rows).await?;
        self.samples.clear();
        self.last_flush = now;
        Ok(path)
    }
}
