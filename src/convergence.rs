//! Repeated sampling until every column of every batch is stable.
//!
//! A round of samples is accepted when the standard deviation of each column, in each
//! non-empty batch, is at most the current threshold. Rejected rounds are discarded and
//! sampled again from scratch. After `retry_limit` consecutive rejections the threshold
//! doubles, so the loop always ends even on noisy machines.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Sampling --ok--> Checking --stable--> Accepted
//!    |  ^              |
//!    |  +---retry------+ (rejections < limit)
//!    |  +--Escalating<-+ (rejections == limit)
//!    +--error--> FatalAborted
//! ```

use tracing::{debug, info};

use crate::error::SweepError;
use crate::sampler::PhaseBatches;
use crate::stats::std_dev;

/// Accepted round plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged {
    pub batches: PhaseBatches,
    /// Threshold the round was accepted under.
    pub threshold: f64,
    /// Sampling rounds taken, including the accepted one.
    pub attempts: u32,
}

enum State {
    Sampling,
    Checking(PhaseBatches),
    Escalating,
    Accepted(PhaseBatches),
    FatalAborted(SweepError),
}

#[derive(Debug, Clone)]
pub struct ConvergenceController {
    base_threshold: f64,
    retry_limit: u32,
    max_threshold: f64,
}

impl ConvergenceController {
    pub fn new(base_threshold: f64, retry_limit: u32) -> Self {
        Self {
            base_threshold,
            retry_limit,
            max_threshold: base_threshold,
        }
    }

    /// Largest threshold any configuration was accepted under so far.
    pub fn max_threshold(&self) -> f64 {
        self.max_threshold
    }

    /// Drive `sample` until a round is stable. The threshold starts from the base value
    /// on every call.
    pub fn converge<F>(&mut self, mut sample: F) -> Result<Converged, SweepError>
    where
        F: FnMut() -> Result<PhaseBatches, SweepError>,
    {
        let mut threshold = self.base_threshold;
        let mut repeats = 0;
        let mut attempts = 0;
        let mut state = State::Sampling;

        loop {
            state = match state {
                State::Sampling => {
                    attempts += 1;
                    match sample() {
                        Ok(batches) => State::Checking(batches),
                        Err(err) => State::FatalAborted(err),
                    }
                }
                State::Checking(batches) => {
                    if is_stable(&batches, threshold) {
                        State::Accepted(batches)
                    } else {
                        repeats += 1;
                        debug!(attempts, repeats, threshold, "Unstable batch, resampling");
                        if repeats >= self.retry_limit {
                            State::Escalating
                        } else {
                            State::Sampling
                        }
                    }
                }
                State::Escalating => {
                    threshold *= 2.0;
                    repeats = 0;
                    info!(threshold, attempts, "Relaxing stability threshold");
                    State::Sampling
                }
                State::Accepted(batches) => {
                    self.max_threshold = self.max_threshold.max(threshold);
                    return Ok(Converged {
                        batches,
                        threshold,
                        attempts,
                    });
                }
                State::FatalAborted(err) => return Err(err),
            };
        }
    }
}

/// Whether every column of every non-empty batch has a standard deviation within
/// `threshold`. Empty batches are trivially stable.
pub fn is_stable(batches: &PhaseBatches, threshold: f64) -> bool {
    batches
        .iter()
        .filter(|batch| !batch.is_empty())
        .all(|batch| {
            (0..batch.width()).all(|idx| {
                std_dev(&batch.column(idx)).is_some_and(|deviation| deviation <= threshold)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BenchmarkConfiguration, Phase};
    use crate::parser::PercentRecord;
    use crate::sampler::SampleBatch;

    fn batch(rows: &[&[f64]]) -> SampleBatch {
        SampleBatch::new(
            rows.iter()
                .map(|row| PercentRecord::new(row.to_vec()))
                .collect(),
        )
    }

    fn load_only(rows: &[&[f64]]) -> PhaseBatches {
        PhaseBatches {
            load: batch(rows),
            update: SampleBatch::default(),
        }
    }

    /// Population std of [x - d, x + d] is d.
    fn spread(deviation: f64) -> PhaseBatches {
        load_only(&[&[10.0 - deviation, 5.0], &[10.0 + deviation, 5.0]])
    }

    #[test]
    fn identical_columns_accept_immediately() {
        let mut controller = ConvergenceController::new(1e-9, 3);
        let result = controller
            .converge(|| Ok(load_only(&[&[12.0, 3.0], &[12.0, 3.0], &[12.0, 3.0]])))
            .unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.threshold, 1e-9);
    }

    #[test]
    fn escalates_once_after_three_rejections() {
        let mut controller = ConvergenceController::new(0.5, 3);
        let mut round = 0;
        let result = controller
            .converge(|| {
                round += 1;
                // Above the base threshold for three rounds, within twice it afterwards.
                Ok(if round <= 3 { spread(0.75) } else { spread(0.9) })
            })
            .unwrap();

        assert_eq!(result.attempts, 4);
        assert_eq!(result.threshold, 1.0);
        assert_eq!(controller.max_threshold(), 1.0);
    }

    #[test]
    fn keeps_doubling_until_stable() {
        let mut controller = ConvergenceController::new(0.1, 2);
        let result = controller.converge(|| Ok(spread(0.7))).unwrap();
        // 0.1 -> 0.2 -> 0.4 -> 0.8, two rejections per level.
        assert_eq!(result.threshold, 0.8);
        assert_eq!(result.attempts, 7);
    }

    #[test]
    fn threshold_resets_between_configurations() {
        let mut controller = ConvergenceController::new(0.5, 1);
        let relaxed = controller.converge(|| Ok(spread(0.75))).unwrap();
        assert_eq!(relaxed.threshold, 1.0);

        let tight = controller.converge(|| Ok(spread(0.25))).unwrap();
        assert_eq!(tight.threshold, 0.5);
        assert_eq!(tight.attempts, 1);
        assert_eq!(controller.max_threshold(), 1.0);
    }

    #[test]
    fn unstable_update_batch_rejects_whole_round() {
        let mut batches = load_only(&[&[1.0], &[1.0]]);
        batches.update = batch(&[&[1.0], &[3.0]]);
        assert!(!is_stable(&batches, 0.5));
        assert!(is_stable(&batches, 1.0));
    }

    #[test]
    fn empty_batches_are_stable() {
        assert!(is_stable(&PhaseBatches::default(), 0.0));
    }

    #[test]
    fn single_sample_is_stable() {
        assert!(is_stable(&load_only(&[&[42.0, 7.0]]), 0.0));
    }

    #[test]
    fn sampling_error_aborts_without_retry() {
        let mut controller = ConvergenceController::new(0.1, 3);
        let mut calls = 0;
        let err = controller
            .converge(|| {
                calls += 1;
                Err(SweepError::BenchmarkFailed {
                    configuration: BenchmarkConfiguration::new(64, Phase::Load),
                    status: "exit status: 1".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SweepError::BenchmarkFailed { .. }));
        assert_eq!(calls, 1);
        assert_eq!(controller.max_threshold(), 0.1);
    }
}
