//! In-process simulated controller
//!
//! Implements [`Robot`] without any network traffic. The plant follows the
//! commanded joint positions according to the active control mode, and faults
//! can be scheduled at specific cycles to exercise failure paths.

use crate::{
    config::{ConnectionConfig, QosConfig, SimulatorConfig},
    events::EventHandler,
    motion::{ControlSignal, MotionState},
    robot::Robot,
    types::ControlMode,
    ControlError, Result,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Nominal interpolation cycle used for velocity estimates when unpaced
const NOMINAL_CYCLE: Duration = Duration::from_millis(4);

/// Joint stiffness used to report torques in impedance mode (Nm/rad)
const IMPEDANCE_STIFFNESS: f64 = 200.0;

/// Link lifecycle of the simulated controller
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    Idle,
    Connected,
    Controlling,
    Stopped,
    Faulted(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultKind {
    /// No motion state arrives; a blocking receive sees the link fault instead
    ReceiveTimeout,
    /// Controller drops the link, e.g. after exceeding its QoS limits
    LinkLost,
    /// Controller refuses the reply for this cycle
    RejectReply,
}

/// Fault scheduled for a zero-based control cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimFault {
    pub at_cycle: u64,
    pub kind: FaultKind,
}

pub struct SimulatedRobot {
    connection: ConnectionConfig,
    sim: SimulatorConfig,
    link: LinkState,
    qos: Option<QosConfig>,
    handler: Option<Box<dyn EventHandler>>,
    motion_state: MotionState,
    signal: ControlSignal,
    commanded: Vec<f64>,
    mode: ControlMode,
    awaiting_reply: bool,
    delivered: u64,
    faults: Vec<SimFault>,
    last_tick: Option<Instant>,
}

impl SimulatedRobot {
    pub fn new(connection: ConnectionConfig, sim: SimulatorConfig) -> Self {
        let dof = connection.dof;
        let mode = connection.initial_control_mode;
        Self {
            connection,
            sim,
            link: LinkState::Idle,
            qos: None,
            handler: None,
            motion_state: MotionState::new(dof),
            signal: ControlSignal::new(dof),
            commanded: vec![0.0; dof],
            mode,
            awaiting_reply: false,
            delivered: 0,
            faults: Vec::new(),
            last_tick: None,
        }
    }

    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn link_state(&self) -> &LinkState {
        &self.link
    }

    pub fn qos_profile(&self) -> Option<&QosConfig> {
        self.qos.as_ref()
    }

    pub fn control_mode(&self) -> ControlMode {
        self.mode
    }

    pub fn commanded_positions(&self) -> &[f64] {
        &self.commanded
    }

    /// Motion states delivered since control started
    pub fn cycles_delivered(&self) -> u64 {
        self.delivered
    }

    fn fault_at(&self, cycle: u64, kind: FaultKind) -> bool {
        self.faults.iter().any(|f| f.at_cycle == cycle && f.kind == kind)
    }

    fn notify_error(&mut self, reason: &str) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_error(reason);
        }
    }

    fn ensure_controlling(&self, operation: &str) -> Result<()> {
        match &self.link {
            LinkState::Controlling => Ok(()),
            LinkState::Faulted(reason) => Err(ControlError::Connection(format!(
                "Cannot {}: link faulted ({})",
                operation, reason
            ))),
            other => Err(ControlError::InvalidState(format!(
                "Cannot {} while {:?}",
                operation, other
            ))),
        }
    }

    fn ensure_pending(&self, operation: &str) -> Result<()> {
        self.ensure_controlling(operation)?;
        if !self.awaiting_reply {
            return Err(ControlError::InvalidState(format!(
                "Cannot {}: no motion state is waiting for a reply",
                operation
            )));
        }
        Ok(())
    }

    /// Take the control signal as the reply to the pending motion state
    fn accept_reply(&mut self, operation: &str) -> Result<()> {
        self.ensure_pending(operation)?;

        let cycle = self.delivered - 1;
        if self.fault_at(cycle, FaultKind::RejectReply) {
            let reason = format!("reply for cycle {} rejected", cycle);
            self.notify_error(&reason);
            return Err(ControlError::Rejected(reason));
        }

        if self.mode.is_joint_space() {
            let values = self.signal.joint_positions().ok_or_else(|| {
                ControlError::InvalidState(format!(
                    "Cannot {}: control signal carries no joint position values",
                    operation
                ))
            })?;
            self.commanded.copy_from_slice(values);
        }

        self.awaiting_reply = false;
        Ok(())
    }

    /// Advance the plant by one interpolation cycle
    fn step_plant(&mut self) {
        let dt = if self.sim.cycle_time_ms > 0 {
            Duration::from_millis(self.sim.cycle_time_ms)
        } else {
            NOMINAL_CYCLE
        }
        .as_secs_f64();

        let state = &mut self.motion_state;
        for (i, &target) in self.commanded.iter().enumerate() {
            let previous = state.measured_positions[i];
            let next = match self.mode {
                ControlMode::JointPosition => target,
                ControlMode::JointImpedance => previous + self.sim.impedance_gain * (target - previous),
                _ => previous,
            };
            state.measured_positions[i] = next;
            state.measured_velocities[i] = (next - previous) / dt;
            state.measured_torques[i] = if self.mode == ControlMode::JointImpedance {
                IMPEDANCE_STIFFNESS * (target - next)
            } else {
                0.0
            };
        }
        state.ipoc += 1;
        state.control_mode = self.mode;
    }

    fn pace(&mut self) {
        if self.sim.cycle_time_ms == 0 {
            return;
        }
        let cycle = Duration::from_millis(self.sim.cycle_time_ms);
        if let Some(last) = self.last_tick {
            let elapsed = last.elapsed();
            if elapsed < cycle {
                std::thread::sleep(cycle - elapsed);
            }
        }
        self.last_tick = Some(Instant::now());
    }
}

impl Robot for SimulatedRobot {
    fn setup(&mut self) -> Result<()> {
        if self.link != LinkState::Idle {
            return Err(ControlError::InvalidState(format!("Setup called while {:?}", self.link)));
        }

        if self.connection.is_secure {
            for (label, path) in [
                ("certificate", &self.connection.certificate_path),
                ("private key", &self.connection.private_key_path),
            ] {
                let path = path
                    .as_ref()
                    .ok_or_else(|| ControlError::Config(format!("Secure setup requires a {} path", label)))?;
                if !path.exists() {
                    return Err(ControlError::Config(format!(
                        "{} file {} not found",
                        label,
                        path.display()
                    )));
                }
            }
        }

        info!(
            "Simulated link set up: client {} -> controller {} (secure: {})",
            self.connection.client_ip_address, self.connection.controller_ip_address, self.connection.is_secure
        );
        self.link = LinkState::Connected;
        Ok(())
    }

    fn set_qos_profile(&mut self, qos: QosConfig) -> Result<()> {
        qos.validate()?;
        if self.link == LinkState::Controlling {
            return Err(ControlError::Unsupported(
                "QoS profile cannot change while controlling".to_string(),
            ));
        }
        debug!("QoS profile: {:?}", qos);
        self.qos = Some(qos);
        Ok(())
    }

    fn register_event_handler(&mut self, handler: Box<dyn EventHandler>) -> Result<()> {
        self.handler = Some(handler);
        Ok(())
    }

    fn start_controlling(&mut self) -> Result<()> {
        if self.link != LinkState::Connected {
            return Err(ControlError::InvalidState(format!(
                "Start controlling requires a connected link, link is {:?}",
                self.link
            )));
        }

        let home = &self.sim.home_position;
        if home.len() != self.connection.dof {
            return Err(ControlError::Config(format!(
                "home_position has {} values, expected {}",
                home.len(),
                self.connection.dof
            )));
        }

        self.mode = self.connection.initial_control_mode;
        self.motion_state = MotionState::new(self.connection.dof);
        self.motion_state.measured_positions.copy_from_slice(home);
        self.motion_state.control_mode = self.mode;
        self.commanded.copy_from_slice(home);
        self.signal.clear();
        self.awaiting_reply = false;
        self.delivered = 0;
        self.last_tick = None;
        self.link = LinkState::Controlling;

        info!("Simulated control started in {}", self.mode);
        if let Some(handler) = self.handler.as_mut() {
            handler.on_sampling();
        }
        Ok(())
    }

    fn receive_motion_state(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_controlling("receive motion state")?;
        if self.awaiting_reply {
            return Err(ControlError::InvalidState(
                "Previous motion state has not been answered".to_string(),
            ));
        }

        let cycle = self.delivered;
        // A blocking receive never times out, the controller faults the link instead
        let silent = self.fault_at(cycle, FaultKind::ReceiveTimeout);
        if self.fault_at(cycle, FaultKind::LinkLost) || (silent && timeout.is_zero()) {
            let reason = format!("controller dropped the link at cycle {}", cycle);
            self.notify_error(&reason);
            self.link = LinkState::Faulted(reason.clone());
            return Err(ControlError::Connection(reason));
        }
        if silent {
            std::thread::sleep(timeout);
            let reason = format!("no motion state within {:?} at cycle {}", timeout, cycle);
            self.notify_error(&reason);
            return Err(ControlError::Timeout(reason));
        }

        self.pace();
        self.step_plant();
        self.delivered += 1;
        self.awaiting_reply = true;
        Ok(())
    }

    fn last_motion_state(&self) -> &MotionState {
        &self.motion_state
    }

    fn control_signal_mut(&mut self) -> &mut ControlSignal {
        &mut self.signal
    }

    fn send_control_signal(&mut self) -> Result<()> {
        self.accept_reply("send control signal")
    }

    fn switch_control_mode(&mut self, mode: ControlMode) -> Result<()> {
        if !mode.is_joint_space() {
            return Err(ControlError::Unsupported(format!(
                "Simulated controller cannot switch to {}",
                mode
            )));
        }
        self.accept_reply("switch control mode")?;

        if mode != self.mode {
            let reason = format!("{} -> {}", self.mode, mode);
            self.mode = mode;
            if let Some(handler) = self.handler.as_mut() {
                handler.on_control_mode_switch(&reason);
            }
        }
        Ok(())
    }

    fn stop_controlling(&mut self) -> Result<()> {
        self.ensure_pending("stop controlling")?;
        self.awaiting_reply = false;
        self.link = LinkState::Stopped;
        info!("Simulated control stopped after {} cycles", self.delivered);
        if let Some(handler) = self.handler.as_mut() {
            handler.on_stopped("stop requested by client");
        }
        Ok(())
    }
}

impl Drop for SimulatedRobot {
    fn drop(&mut self) {
        if self.link == LinkState::Controlling {
            warn!("Simulated robot dropped while controlling, link closed without stop");
        }
    }
}
