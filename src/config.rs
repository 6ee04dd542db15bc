//! Configuration loading for the external control client

use crate::{
    control_loop::ModeSwitchPolicy, json_output::MAX_DECIMAL_PLACES, types::ControlMode, ControlError, Result,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub qos: QosConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Link setup towards the controller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub client_ip_address: IpAddr,
    pub controller_ip_address: IpAddr,
    #[serde(default = "default_initial_mode")]
    pub initial_control_mode: ControlMode,
    /// Requires `RtEnableSecurity: true` on the controller side
    #[serde(default)]
    pub is_secure: bool,
    pub certificate_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
    #[serde(default = "default_dof")]
    pub dof: usize,
    /// Zero blocks until a motion state arrives
    #[serde(default)]
    pub receive_timeout_ms: u64,
}

/// Packet loss tolerances before the link is faulted
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QosConfig {
    pub consecutive_packet_loss_limit: u32,
    pub packet_loss_in_timeframe_limit: u32,
    pub timeframe_ms: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    pub cycles: u64,
    pub sine_step: f64,
    pub clamp_joint: usize,
    pub clamp_limit: f64,
    pub mode_switch: ModeSwitchPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub publish_every: u32,
    pub decimal_places: Option<u32>,
    pub pretty: bool,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub home_position: Vec<f64>,
    pub cycle_time_ms: u64,
    pub impedance_gain: f64,
}

fn default_initial_mode() -> ControlMode {
    ControlMode::JointPosition
}

fn default_dof() -> usize {
    6
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            consecutive_packet_loss_limit: 5,
            packet_loss_in_timeframe_limit: 10,
            timeframe_ms: 1000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cycles: 10_000,
            sine_step: 0.0004,
            clamp_joint: 1,
            clamp_limit: 0.85,
            mode_switch: ModeSwitchPolicy::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            publish_every: 100,
            decimal_places: Some(4),
            pretty: false,
            channel_capacity: 1024,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            home_position: vec![0.0, -0.5, 0.5, 0.0, 0.5, 0.0],
            cycle_time_ms: 0,
            impedance_gain: 0.5,
        }
    }
}

impl QosConfig {
    pub fn validate(&self) -> Result<()> {
        if self.consecutive_packet_loss_limit == 0 {
            return Err(ControlError::Config("consecutive_packet_loss_limit must be positive".to_string()));
        }
        if self.packet_loss_in_timeframe_limit == 0 {
            return Err(ControlError::Config("packet_loss_in_timeframe_limit must be positive".to_string()));
        }
        if self.timeframe_ms == 0 {
            return Err(ControlError::Config("timeframe_ms must be positive".to_string()));
        }
        if self.packet_loss_in_timeframe_limit < self.consecutive_packet_loss_limit {
            return Err(ControlError::Config(format!(
                "packet_loss_in_timeframe_limit ({}) is below consecutive_packet_loss_limit ({})",
                self.packet_loss_in_timeframe_limit, self.consecutive_packet_loss_limit
            )));
        }
        Ok(())
    }
}

impl ConnectionConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

impl TelemetryConfig {
    /// Get decimal places with default fallback
    pub fn decimal_places(&self) -> u32 {
        self.decimal_places.unwrap_or(4)
    }
}

impl Config {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dof = self.connection.dof;
        if dof == 0 {
            return Err(ControlError::Config("dof must be positive".to_string()));
        }
        if self.connection.is_secure
            && (self.connection.certificate_path.is_none() || self.connection.private_key_path.is_none())
        {
            return Err(ControlError::Config(
                "Secure setup requires certificate_path and private_key_path".to_string(),
            ));
        }
        if !self.connection.initial_control_mode.is_joint_space() {
            return Err(ControlError::Config(format!(
                "Initial control mode {} is not a joint-space mode",
                self.connection.initial_control_mode
            )));
        }
        self.qos.validate()?;

        if self.motion.clamp_joint >= dof {
            return Err(ControlError::Config(format!(
                "clamp_joint {} out of range for {} joints",
                self.motion.clamp_joint, dof
            )));
        }
        if !self.motion.sine_step.is_finite() || !self.motion.clamp_limit.is_finite() {
            return Err(ControlError::Config("Motion parameters must be finite".to_string()));
        }
        self.motion.mode_switch.validate()?;

        if self.telemetry.publish_every == 0 {
            return Err(ControlError::Config("publish_every must be positive".to_string()));
        }
        if self.telemetry.channel_capacity == 0 {
            return Err(ControlError::Config("channel_capacity must be positive".to_string()));
        }
        if self.telemetry.decimal_places() > MAX_DECIMAL_PLACES {
            return Err(ControlError::Config(format!(
                "decimal_places {} exceeds {}",
                self.telemetry.decimal_places(),
                MAX_DECIMAL_PLACES
            )));
        }

        if self.simulator.home_position.len() != dof {
            return Err(ControlError::Config(format!(
                "home_position has {} values, expected {}",
                self.simulator.home_position.len(),
                dof
            )));
        }
        if !(0.0..=1.0).contains(&self.simulator.impedance_gain) {
            return Err(ControlError::Config("impedance_gain must be within [0, 1]".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
connection:
  client_ip_address: 192.168.1.150
  controller_ip_address: 192.168.1.100
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::load_from_str(MINIMAL).unwrap();
        assert_eq!(config.connection.dof, 6);
        assert_eq!(config.connection.initial_control_mode, ControlMode::JointPosition);
        assert_eq!(config.connection.receive_timeout(), Duration::ZERO);
        assert_eq!(config.qos, QosConfig::default());
        assert_eq!(config.motion.cycles, 10_000);
        assert_eq!(config.motion.clamp_joint, 1);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_secure_setup_requires_key_paths() {
        let yaml = format!("{}  is_secure: true\n  certificate_path: cert.pem\n", MINIMAL);
        let err = Config::load_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("private_key_path"));
    }

    #[test]
    fn test_rejects_zero_qos_limits() {
        let qos = QosConfig { consecutive_packet_loss_limit: 0, ..QosConfig::default() };
        assert!(qos.validate().is_err());

        let qos = QosConfig { timeframe_ms: 0, ..QosConfig::default() };
        assert!(qos.validate().is_err());

        let qos = QosConfig {
            consecutive_packet_loss_limit: 10,
            packet_loss_in_timeframe_limit: 5,
            timeframe_ms: 1000,
        };
        assert!(qos.validate().is_err());
    }

    #[test]
    fn test_clamp_joint_out_of_range() {
        let yaml = format!("{}  dof: 1\nsimulator:\n  home_position: [0.0]\n  cycle_time_ms: 0\n  impedance_gain: 0.5\n", MINIMAL);
        let err = Config::load_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("clamp_joint"));
    }

    #[test]
    fn test_home_position_length_must_match_dof() {
        let yaml = format!("{}  dof: 7\n", MINIMAL);
        let err = Config::load_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("home_position"));
    }

    #[test]
    fn test_invalid_ip_is_a_yaml_error() {
        let yaml = MINIMAL.replace("192.168.1.100", "not-an-address");
        assert!(matches!(Config::load_from_str(&yaml), Err(ControlError::Yaml(_))));
    }

    #[test]
    fn test_shipped_default_config_loads() {
        let config = Config::load_from_path("config/default_config.yaml").unwrap();
        assert_eq!(config.connection.controller_ip_address.to_string(), "192.168.1.100");
        assert_eq!(config.motion.mode_switch, ModeSwitchPolicy::default());
        assert_eq!(config.simulator.cycle_time_ms, 4);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let yaml = format!("{}motion:\n  cycles: 25\n", MINIMAL);
        let config = Config::load_from_str(&yaml).unwrap();
        assert_eq!(config.motion.cycles, 25);
        assert_eq!(config.motion.clamp_limit, 0.85);
    }

    #[test]
    fn test_decimal_places_upper_bound() {
        let yaml = format!("{}telemetry:\n  decimal_places: 400\n", MINIMAL);
        let err = Config::load_from_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("decimal_places"));

        let yaml = format!("{}telemetry:\n  decimal_places: 15\n", MINIMAL);
        assert_eq!(Config::load_from_str(&yaml).unwrap().telemetry.decimal_places(), 15);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load_from_path("config/does_not_exist.yaml").unwrap_err();
        assert!(matches!(err, ControlError::Io(_)));
    }
}
