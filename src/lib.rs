//! extctl - External real-time control client for industrial robot controllers
//!
//! Streams motion-state request/response cycles with a controller over an
//! external control link, commanding a sinusoidal joint-position offset around
//! the pose captured on the first cycle, and shuts the link down in order.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use extctl::{Config, ControlSession, SimulatedRobot, TelemetrySink};
//! use std::sync::atomic::AtomicBool;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_from_path("config/default_config.yaml")?;
//!     let mut robot = SimulatedRobot::new(config.connection.clone(), config.simulator.clone());
//!
//!     let report = ControlSession::new(config)
//!         .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))?;
//!     println!("Completed {} cycles", report.summary.cycles_completed);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Robot**: client-side surface of the control link
//! - **SimulatedRobot**: in-process controller used for tests and dry runs
//! - **ControlSession**: setup, QoS, start, loop, final receive and stop
//! - **ControlLoop**: per-cycle receive, command and reply
//! - **SineOffset**: joint-position command generator
//! - **TelemetryPublisher**: transport-agnostic telemetry interface

pub mod config;
pub mod control_loop;
pub mod error;
pub mod events;
pub mod json_output;
pub mod motion;
pub mod robot;
pub mod session;
pub mod simulator;
pub mod telemetry;
pub mod trajectory;
pub mod types;

// High-level exports for easy usage
pub use config::{Config, ConnectionConfig, MotionConfig, QosConfig, SimulatorConfig, TelemetryConfig};
pub use error::{ControlError, Result, ReturnCode};
pub use robot::Robot;
pub use session::{ControlSession, SessionError, SessionReport};
pub use simulator::{FaultKind, LinkState, SimFault, SimulatedRobot};
pub use types::ControlMode;

// Core component exports for advanced usage
pub use control_loop::{ControlLoop, LoopError, LoopSummary, ModeSwitchPolicy};
pub use events::{ControlEventHandler, EventHandler};
pub use motion::{ControlSignal, MotionState};
pub use trajectory::SineOffset;

// Telemetry exports
pub use json_output::{CycleRecord, SessionEvent, SessionStage};
pub use telemetry::{spawn_forwarder, ConsoleTelemetry, NoOpTelemetry, TelemetryPublisher, TelemetrySink};
