//! JSON records for control session telemetry
//!
//! Structured output for cycle samples and session lifecycle events that can
//! be consumed by external tools and monitoring systems.

use crate::{motion::MotionState, types::ControlMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Get current timestamp as f64 seconds since UNIX epoch with consistent precision
pub fn current_timestamp() -> f64 {
    // Microsecond resolution keeps 6 decimal places
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Finest rounding an f64 joint value can hold without overflowing
pub const MAX_DECIMAL_PLACES: u32 = 15;

/// Round every value to `decimal_places`, capped at [`MAX_DECIMAL_PLACES`]
pub fn round_values(values: &[f64], decimal_places: u32) -> Vec<f64> {
    let multiplier = 10.0_f64.powi(decimal_places.min(MAX_DECIMAL_PLACES) as i32);
    values.iter().map(|v| (v * multiplier).round() / multiplier).collect()
}

/// Session lifecycle stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Setup,
    QosProfile,
    RegisterHandler,
    StartControlling,
    ControlLoop,
    FinalReceive,
    StopControlling,
}

impl SessionStage {
    /// Message prefix used when this stage fails
    pub fn failure_label(self) -> &'static str {
        match self {
            SessionStage::Setup => "Setting up network failed",
            SessionStage::QosProfile => "Setting QoS profile failed",
            SessionStage::RegisterHandler => "Registering event handler failed",
            SessionStage::StartControlling => "Opening control channel failed",
            SessionStage::ControlLoop => "Control loop failed",
            SessionStage::FinalReceive => "Recv req before stop failed",
            SessionStage::StopControlling => "Send stop failed",
        }
    }
}

/// One sampled control cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: f64,
    /// Event type for JSON parsing
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: Uuid,
    pub counter: u64,
    pub ipoc: u64,
    pub control_mode: ControlMode,
    pub measured_positions: Vec<f64>,
    pub commanded_positions: Vec<f64>,
}

impl CycleRecord {
    pub fn new_rounded(
        session_id: Uuid,
        counter: u64,
        state: &MotionState,
        commanded: &[f64],
        decimal_places: u32,
    ) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "cycle".to_string(),
            session_id,
            counter,
            ipoc: state.ipoc,
            control_mode: state.control_mode,
            measured_positions: round_values(&state.measured_positions, decimal_places),
            commanded_positions: round_values(commanded, decimal_places),
        }
    }
}

/// Session lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: f64,
    /// Event type for JSON parsing
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: Uuid,
    pub stage: SessionStage,
    pub success: bool,
    pub message: String,
}

impl SessionEvent {
    pub fn new(session_id: Uuid, stage: SessionStage, success: bool, message: &str) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "session".to_string(),
            session_id,
            stage,
            success,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_values() {
        assert_eq!(round_values(&[0.123456, -1.98765], 3), vec![0.123, -1.988]);
    }

    #[test]
    fn test_round_values_caps_precision() {
        let values = [0.5, -1.25, 3.14159];
        assert_eq!(round_values(&values, 400), round_values(&values, MAX_DECIMAL_PLACES));
        assert!(round_values(&values, 400).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cycle_record_json_shape() {
        let mut state = MotionState::new(2);
        state.ipoc = 42;
        state.control_mode = ControlMode::JointImpedance;
        state.measured_positions = vec![0.123456, 0.5];

        let record = CycleRecord::new_rounded(Uuid::nil(), 7, &state, &[0.111111, 0.499999], 4);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "cycle");
        assert_eq!(json["counter"], 7);
        assert_eq!(json["ipoc"], 42);
        assert_eq!(json["control_mode"], "joint_impedance");
        assert_eq!(json["measured_positions"][0], 0.1235);
        assert_eq!(json["commanded_positions"][1], 0.5);
    }

    #[test]
    fn test_session_event_json_shape() {
        let event = SessionEvent::new(Uuid::nil(), SessionStage::StartControlling, false, "refused");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["stage"], "start_controlling");
        assert_eq!(json["success"], false);
        assert!(current_timestamp() > 1.6e9);
    }
}
