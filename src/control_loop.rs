//! Real-time request/response cycle loop
//!
//! Each cycle receives one motion state, computes the sine-offset joint
//! command and answers the controller, either with a plain control signal or
//! with a control mode switch depending on the configured policy.

use crate::{
    config::{ConnectionConfig, MotionConfig},
    robot::Robot,
    telemetry::TelemetrySink,
    trajectory::SineOffset,
    types::ControlMode,
    ControlError, ReturnCode,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// How each cycle is answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ModeSwitchPolicy {
    /// Request `even` on even counters and `odd` on odd counters
    Alternate { even: ControlMode, odd: ControlMode },
    /// Request `mode` once at `cycle`, send plain control signals otherwise
    AtCycle { cycle: u64, mode: ControlMode },
    /// Always send plain control signals
    Never,
}

impl Default for ModeSwitchPolicy {
    fn default() -> Self {
        ModeSwitchPolicy::Alternate {
            even: ControlMode::JointPosition,
            odd: ControlMode::JointImpedance,
        }
    }
}

impl ModeSwitchPolicy {
    /// Mode to request for `counter`, `None` for a plain control signal
    pub fn mode_for(&self, counter: u64) -> Option<ControlMode> {
        match *self {
            ModeSwitchPolicy::Alternate { even, odd } => Some(if counter % 2 == 1 { odd } else { even }),
            ModeSwitchPolicy::AtCycle { cycle, mode } => (counter == cycle).then_some(mode),
            ModeSwitchPolicy::Never => None,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        let modes = match *self {
            ModeSwitchPolicy::Alternate { even, odd } => vec![even, odd],
            ModeSwitchPolicy::AtCycle { mode, .. } => vec![mode],
            ModeSwitchPolicy::Never => Vec::new(),
        };
        match modes.into_iter().find(|m| !m.is_joint_space()) {
            Some(mode) => Err(ControlError::Config(format!(
                "Mode switch target {} is not a joint-space mode",
                mode
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Recv req failed at cycle {counter}: {source}")]
    Receive { counter: u64, source: ControlError },

    #[error("Setting control values failed at cycle {counter}: {source}")]
    Command { counter: u64, source: ControlError },

    #[error("Send req failed at cycle {counter}: {source}")]
    Send { counter: u64, source: ControlError },
}

impl LoopError {
    pub fn counter(&self) -> u64 {
        match self {
            LoopError::Receive { counter, .. }
            | LoopError::Command { counter, .. }
            | LoopError::Send { counter, .. } => *counter,
        }
    }

    pub fn return_code(&self) -> ReturnCode {
        match self {
            LoopError::Receive { source, .. }
            | LoopError::Command { source, .. }
            | LoopError::Send { source, .. } => source.return_code(),
        }
    }
}

/// Outcome of a completed or interrupted loop
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub cycles_completed: u64,
    pub interrupted: bool,
    pub last_ipoc: Option<u64>,
    pub mode_switches: u64,
    pub start_position: Option<Vec<f64>>,
}

pub struct ControlLoop {
    cycles: u64,
    receive_timeout: Duration,
    policy: ModeSwitchPolicy,
    sine: SineOffset,
}

impl ControlLoop {
    pub fn new(motion: &MotionConfig, connection: &ConnectionConfig) -> Self {
        Self {
            cycles: motion.cycles,
            receive_timeout: connection.receive_timeout(),
            policy: motion.mode_switch.clone(),
            sine: SineOffset::from_config(motion),
        }
    }

    /// Run up to the configured number of cycles
    ///
    /// Stops early, without error, once `shutdown` is raised. The last motion
    /// state is left answered, so the caller must receive once more before
    /// it can stop controlling.
    pub fn run<R: Robot + ?Sized>(
        &mut self,
        robot: &mut R,
        telemetry: &mut TelemetrySink,
        shutdown: &AtomicBool,
    ) -> Result<LoopSummary, LoopError> {
        let mut summary = LoopSummary {
            cycles_completed: 0,
            interrupted: false,
            last_ipoc: None,
            mode_switches: 0,
            start_position: None,
        };

        info!("Start ctrl loop ({} cycles)", self.cycles);
        let mut counter = 0u64;
        while counter < self.cycles {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, leaving control loop at cycle {}", counter);
                summary.interrupted = true;
                break;
            }

            robot
                .receive_motion_state(self.receive_timeout)
                .map_err(|source| LoopError::Receive { counter, source })?;
            debug!("Recv req");

            let (reply, reported_mode, ipoc) = {
                let state = robot.last_motion_state();
                (self.sine.next(counter, &state.measured_positions), state.control_mode, state.ipoc)
            };

            robot
                .control_signal_mut()
                .add_joint_position_values(&reply)
                .map_err(|source| LoopError::Command { counter, source })?;
            debug!("Set values");

            let answer = match self.policy.mode_for(counter) {
                Some(mode) => {
                    if mode != reported_mode {
                        summary.mode_switches += 1;
                    }
                    robot.switch_control_mode(mode)
                }
                None => robot.send_control_signal(),
            };
            answer.map_err(|source| LoopError::Send { counter, source })?;
            debug!("Sent reply");

            telemetry.record_cycle(counter, robot.last_motion_state(), &reply);
            summary.last_ipoc = Some(ipoc);

            counter += 1;
            summary.cycles_completed = counter;
            debug!("Counter: {}", counter);
        }

        summary.start_position = self.sine.start().map(<[f64]>::to_vec);
        info!(
            "End ctrl loop: {} cycles, {} mode switches",
            summary.cycles_completed, summary.mode_switches
        );
        Ok(summary)
    }
}
