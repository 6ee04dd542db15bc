//! Client-side surface of the external control link
//!
//! A [`Robot`] owns one connection to a controller. After `start_controlling`
//! the controller drives the cadence: every motion state received must be
//! answered by exactly one of `send_control_signal`, `switch_control_mode` or
//! `stop_controlling` before the next state can be received.

use crate::{
    config::QosConfig,
    events::EventHandler,
    motion::{ControlSignal, MotionState},
    types::ControlMode,
    Result,
};
use std::time::Duration;

pub trait Robot: Send {
    /// Open the link using the connection configuration
    fn setup(&mut self) -> Result<()>;

    /// Packet loss tolerances applied once control starts
    fn set_qos_profile(&mut self, qos: QosConfig) -> Result<()>;

    /// Replace the handler that receives link events
    fn register_event_handler(&mut self, handler: Box<dyn EventHandler>) -> Result<()>;

    /// Open the control channel in the configured initial control mode
    fn start_controlling(&mut self) -> Result<()>;

    /// Wait for the next motion state; a zero timeout blocks until one arrives
    fn receive_motion_state(&mut self, timeout: Duration) -> Result<()>;

    fn last_motion_state(&self) -> &MotionState;

    fn control_signal_mut(&mut self) -> &mut ControlSignal;

    /// Answer the pending motion state with the current control signal
    fn send_control_signal(&mut self) -> Result<()>;

    /// Answer the pending motion state and request a control mode change
    fn switch_control_mode(&mut self, mode: ControlMode) -> Result<()>;

    /// Answer the pending motion state with a stop request
    fn stop_controlling(&mut self) -> Result<()>;
}
