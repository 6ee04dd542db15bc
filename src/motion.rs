//! Per-cycle data exchanged over the control link

use crate::{types::ControlMode, ControlError, Result};
use serde::{Deserialize, Serialize};

/// Motion state reported by the controller for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    /// Interpolation cycle counter of the controller
    pub ipoc: u64,
    pub measured_positions: Vec<f64>,
    pub measured_velocities: Vec<f64>,
    pub measured_torques: Vec<f64>,
    pub control_mode: ControlMode,
}

impl MotionState {
    pub fn new(dof: usize) -> Self {
        Self {
            ipoc: 0,
            measured_positions: vec![0.0; dof],
            measured_velocities: vec![0.0; dof],
            measured_torques: vec![0.0; dof],
            control_mode: ControlMode::Unspecified,
        }
    }

    pub fn dof(&self) -> usize {
        self.measured_positions.len()
    }
}

/// Commanded values sent back to the controller for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSignal {
    dof: usize,
    joint_positions: Option<Vec<f64>>,
}

impl ControlSignal {
    pub fn new(dof: usize) -> Self {
        Self { dof, joint_positions: None }
    }

    /// Set the commanded joint positions (radians) for the next reply
    pub fn add_joint_position_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.dof {
            return Err(ControlError::InvalidState(format!(
                "Expected {} joint position values, got {}",
                self.dof,
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ControlError::InvalidState(format!(
                "Joint position value {} is not finite",
                index
            )));
        }

        match &mut self.joint_positions {
            Some(current) => current.copy_from_slice(values),
            None => self.joint_positions = Some(values.to_vec()),
        }
        Ok(())
    }

    pub fn joint_positions(&self) -> Option<&[f64]> {
        self.joint_positions.as_deref()
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn clear(&mut self) {
        self.joint_positions = None;
    }
}
