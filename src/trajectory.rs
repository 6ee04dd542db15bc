//! Sinusoidal joint-position offset around a captured start pose

use crate::config::MotionConfig;

/// Adds `-sin(counter * step)` to every joint of the start pose
///
/// The start pose is the measured position of the first cycle. The offset
/// applied on a cycle is the one computed at the end of the previous cycle,
/// so cycle 0 commands the start pose unchanged. One joint is capped from
/// above to keep it inside its axis limit.
#[derive(Debug, Clone)]
pub struct SineOffset {
    step: f64,
    clamp_joint: usize,
    clamp_limit: f64,
    start: Option<Vec<f64>>,
    offset: f64,
}

impl SineOffset {
    pub fn new(step: f64, clamp_joint: usize, clamp_limit: f64) -> Self {
        Self {
            step,
            clamp_joint,
            clamp_limit,
            start: None,
            offset: 0.0,
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(config.sine_step, config.clamp_joint, config.clamp_limit)
    }

    pub fn start(&self) -> Option<&[f64]> {
        self.start.as_deref()
    }

    /// Commanded positions for `counter`, given this cycle's measured positions
    pub fn next(&mut self, counter: u64, measured: &[f64]) -> Vec<f64> {
        if counter == 0 || self.start.is_none() {
            self.start = Some(measured.to_vec());
        }

        let offset = self.offset;
        let mut reply: Vec<f64> = self
            .start
            .iter()
            .flatten()
            .map(|q| q + offset)
            .collect();

        if let Some(q) = reply.get_mut(self.clamp_joint) {
            if *q > self.clamp_limit {
                *q = self.clamp_limit;
            }
        }

        self.offset = -(counter as f64 * self.step).sin();
        reply
    }
}
