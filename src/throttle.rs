use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{PublishOutcome, Sample};
use crate::publisher::{Publisher, StatusTemplate};

/// caps outbound status lines to one per `min_interval`
///
/// only a successful publish moves the clock forward, so after a failure the
/// next cycle tries again. until the first success every cycle publishes.
pub struct PublishThrottle {
    min_interval: Duration,
    last_success: Option<Instant>,
    template: StatusTemplate,
}

impl PublishThrottle {
    pub fn new(min_interval: Duration, template: StatusTemplate) -> Self {
        Self {
            min_interval,
            last_success: None,
            template,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_success {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    pub async fn maybe_publish(
        &mut self,
        sample: &Sample,
        now: Instant,
        publisher: &mut dyn Publisher,
    ) -> PublishOutcome {
        if !self.is_due(now) {
            return PublishOutcome::Skipped;
        }

        let text = self.template.render(sample);
        match publisher.publish(&text, sample).await {
            Ok(()) => {
                self.last_success = Some(now);
                PublishOutcome::Sent
            }
            Err(e) => {
                tracing::warn!("[PUBLISH] ⚠ {} (will retry next cycle)", e);
                PublishOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GaugesConfig;
    use crate::error::PublishError;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// records every attempt, fails while `failing` is set
    #[derive(Default)]
    struct Recorder {
        attempts: Vec<String>,
        failing: bool,
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&mut self, text: &str, _sample: &Sample) -> Result<(), PublishError> {
            self.attempts.push(text.to_string());
            if self.failing {
                return Err(PublishError::Rejected {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn sample() -> Sample {
        let taken_at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Sample::new(taken_at, Some(1.0), Some(2.0))
    }

    fn throttle() -> PublishThrottle {
        PublishThrottle::new(Duration::from_secs(60), StatusTemplate::new(&GaugesConfig::default()))
    }

    #[tokio::test]
    async fn test_sent_skipped_sent() {
        let mut throttle = throttle();
        let mut publisher = Recorder::default();
        let t0 = Instant::now();

        let outcomes = [
            throttle.maybe_publish(&sample(), t0, &mut publisher).await,
            throttle.maybe_publish(&sample(), t0 + Duration::from_secs(30), &mut publisher).await,
            throttle.maybe_publish(&sample(), t0 + Duration::from_secs(61), &mut publisher).await,
        ];

        assert_eq!(outcomes, [PublishOutcome::Sent, PublishOutcome::Skipped, PublishOutcome::Sent]);
        assert_eq!(publisher.attempts.len(), 2);
        assert_eq!(throttle.last_success, Some(t0 + Duration::from_secs(61)));
    }

    #[tokio::test]
    async fn test_boundary_is_inclusive() {
        let mut throttle = throttle();
        let mut publisher = Recorder::default();
        let t0 = Instant::now();

        throttle.maybe_publish(&sample(), t0, &mut publisher).await;
        assert!(!throttle.is_due(t0 + Duration::from_secs(59)));
        assert!(throttle.is_due(t0 + Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_failure_keeps_last_success() {
        let mut throttle = throttle();
        let mut publisher = Recorder { failing: true, ..Recorder::default() };
        let t0 = Instant::now();

        assert_eq!(throttle.maybe_publish(&sample(), t0, &mut publisher).await, PublishOutcome::Failed);
        assert_eq!(throttle.last_success, None);

        // still due on the very next cycle
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(throttle.maybe_publish(&sample(), t1, &mut publisher).await, PublishOutcome::Failed);

        publisher.failing = false;
        let t2 = t0 + Duration::from_secs(10);
        assert_eq!(throttle.maybe_publish(&sample(), t2, &mut publisher).await, PublishOutcome::Sent);
        assert_eq!(throttle.last_success, Some(t2));

        // one attempt per call, no same-cycle retry
        assert_eq!(publisher.attempts.len(), 3);
    }
}
