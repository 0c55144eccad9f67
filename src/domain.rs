use chrono::NaiveDateTime;
use serde::Serialize;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// one acquisition cycle: both gauges plus the local wall-clock stamp
///
/// either reading is `None` when that gauge did not answer in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// local date and time the cycle ran
    pub taken_at: NaiveDateTime,
    /// first gauge (address 1), mbar
    pub reading1: Option<f64>,
    /// second gauge (address 2), mbar
    pub reading2: Option<f64>,
}

impl Sample {
    pub fn new(taken_at: NaiveDateTime, reading1: Option<f64>, reading2: Option<f64>) -> Self {
        Self { taken_at, reading1, reading2 }
    }

    pub fn date(&self) -> String {
        self.taken_at.format(DATE_FORMAT).to_string()
    }

    pub fn time(&self) -> String {
        self.taken_at.format(TIME_FORMAT).to_string()
    }

    /// number of gauges that did not answer this cycle
    pub fn absent_count(&self) -> usize {
        [self.reading1, self.reading2].iter().filter(|r| r.is_none()).count()
    }

    /// `[date, time, reading1, reading2]`, blanks for absent readings
    pub fn to_row(&self) -> [String; 4] {
        [
            self.date(),
            self.time(),
            format_reading(self.reading1),
            format_reading(self.reading2),
        ]
    }
}

/// render a reading for text output, empty when absent
///
/// always exponent form (`4e-8`, `2.5e-3`): vacuum readings span many decades
/// and a plain decimal would bury the digits in leading zeros.
pub fn format_reading(reading: Option<f64>) -> String {
    reading.map(|value| format!("{:e}", value)).unwrap_or_default()
}

/// what the throttle did with a sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// too soon after the last successful publish
    Skipped,
    Sent,
    /// the endpoint errored; retried no earlier than the next cycle
    Failed,
}
