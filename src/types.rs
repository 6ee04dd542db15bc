//! Control modes understood by the external control interface

use crate::{ControlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control mode requested from the controller
///
/// The numeric codes are the ones carried on the control link, so
/// `ControlMode::from_code(2)` is joint impedance control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Unspecified = 0,
    JointPosition = 1,
    JointImpedance = 2,
    JointVelocity = 3,
    JointTorque = 4,
    CartesianPosition = 5,
    CartesianImpedance = 6,
    CartesianVelocity = 7,
    Wrench = 8,
}

impl ControlMode {
    pub fn from_code(code: u8) -> Result<Self> {
        let mode = match code {
            0 => ControlMode::Unspecified,
            1 => ControlMode::JointPosition,
            2 => ControlMode::JointImpedance,
            3 => ControlMode::JointVelocity,
            4 => ControlMode::JointTorque,
            5 => ControlMode::CartesianPosition,
            6 => ControlMode::CartesianImpedance,
            7 => ControlMode::CartesianVelocity,
            8 => ControlMode::Wrench,
            _ => return Err(ControlError::Config(format!("Unknown control mode code: {}", code))),
        };
        Ok(mode)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the mode is commanded with joint-space values
    pub fn is_joint_space(self) -> bool {
        matches!(
            self,
            ControlMode::JointPosition
                | ControlMode::JointImpedance
                | ControlMode::JointVelocity
                | ControlMode::JointTorque
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlMode::Unspecified => "UNSPECIFIED",
            ControlMode::JointPosition => "JOINT_POSITION_CONTROL",
            ControlMode::JointImpedance => "JOINT_IMPEDANCE_CONTROL",
            ControlMode::JointVelocity => "JOINT_VELOCITY_CONTROL",
            ControlMode::JointTorque => "JOINT_TORQUE_CONTROL",
            ControlMode::CartesianPosition => "CARTESIAN_POSITION_CONTROL",
            ControlMode::CartesianImpedance => "CARTESIAN_IMPEDANCE_CONTROL",
            ControlMode::CartesianVelocity => "CARTESIAN_VELOCITY_CONTROL",
            ControlMode::Wrench => "WRENCH_CONTROL",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
