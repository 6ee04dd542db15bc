//! Control session - the orderly start, stream and stop sequence
//!
//! Drives a [`Robot`] through setup, QoS negotiation, handler registration,
//! the cycle loop and the final stop handshake. The first failing stage ends
//! the session; nothing is retried.

use crate::{
    config::Config,
    control_loop::{ControlLoop, LoopError, LoopSummary},
    events::{ControlEventHandler, EventHandler},
    json_output::SessionStage,
    robot::Robot,
    telemetry::TelemetrySink,
    ControlError, ReturnCode,
};
use std::sync::atomic::AtomicBool;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{}: {}", .stage.failure_label(), .source)]
    Stage { stage: SessionStage, source: ControlError },

    #[error(transparent)]
    Loop(#[from] LoopError),
}

impl SessionError {
    pub fn stage(&self) -> SessionStage {
        match self {
            SessionError::Stage { stage, .. } => *stage,
            SessionError::Loop(_) => SessionStage::ControlLoop,
        }
    }

    pub fn return_code(&self) -> ReturnCode {
        match self {
            SessionError::Stage { source, .. } => source.return_code(),
            SessionError::Loop(e) => e.return_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub summary: LoopSummary,
}

pub struct ControlSession {
    config: Config,
    handler: Option<Box<dyn EventHandler>>,
}

impl ControlSession {
    pub fn new(config: Config) -> Self {
        Self { config, handler: None }
    }

    /// Register `handler` instead of the logging [`ControlEventHandler`]
    pub fn with_event_handler(mut self, handler: Box<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the complete session against `robot`
    pub fn run<R: Robot + ?Sized>(
        &mut self,
        robot: &mut R,
        telemetry: &mut TelemetrySink,
        shutdown: &AtomicBool,
    ) -> Result<SessionReport, SessionError> {
        info!(
            "Starting control session {} ({} -> {})",
            telemetry.session_id(),
            self.config.connection.client_ip_address,
            self.config.connection.controller_ip_address
        );

        // QoS is handed over before the setup result is inspected
        let setup = robot.setup();
        let qos = robot.set_qos_profile(self.config.qos);
        check(telemetry, SessionStage::Setup, setup)?;
        check(telemetry, SessionStage::QosProfile, qos)?;

        let handler: Box<dyn EventHandler> = match self.handler.take() {
            Some(handler) => handler,
            None => Box::new(ControlEventHandler::new()),
        };
        check(telemetry, SessionStage::RegisterHandler, robot.register_event_handler(handler))?;

        check(telemetry, SessionStage::StartControlling, robot.start_controlling())?;

        let mut control = ControlLoop::new(&self.config.motion, &self.config.connection);
        let summary = match control.run(robot, telemetry, shutdown) {
            Ok(summary) => {
                telemetry.record_session(
                    SessionStage::ControlLoop,
                    true,
                    &format!("{} cycles completed", summary.cycles_completed),
                );
                summary
            }
            Err(e) => {
                error!("{}", e);
                telemetry.record_session(SessionStage::ControlLoop, false, &e.to_string());
                return Err(e.into());
            }
        };

        // The controller only accepts a stop as the answer to a motion state
        let final_receive = robot.receive_motion_state(self.config.connection.receive_timeout());
        check(telemetry, SessionStage::FinalReceive, final_receive)?;

        info!("Sent stop");
        check(telemetry, SessionStage::StopControlling, robot.stop_controlling())?;

        telemetry.record_custom(
            "summary",
            serde_json::json!({
                "cycles_completed": summary.cycles_completed,
                "mode_switches": summary.mode_switches,
                "interrupted": summary.interrupted,
                "last_ipoc": summary.last_ipoc,
            }),
        );
        info!("Control session {} finished", telemetry.session_id());
        Ok(SessionReport {
            session_id: telemetry.session_id(),
            summary,
        })
    }
}

fn check(telemetry: &mut TelemetrySink, stage: SessionStage, result: crate::Result<()>) -> Result<(), SessionError> {
    match result {
        Ok(()) => {
            telemetry.record_session(stage, true, "ok");
            Ok(())
        }
        Err(source) => {
            let err = SessionError::Stage { stage, source };
            error!("{} (ret code {})", err, err.return_code().code());
            telemetry.record_session(stage, false, &err.to_string());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::RecordingHandler;
    use crate::json_output::{CycleRecord, SessionEvent};
    use crate::simulator::{FaultKind, LinkState, SimFault, SimulatedRobot};
    use crate::telemetry::{spawn_forwarder, TelemetryPublisher};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn config(cycles: u64) -> Config {
        let mut config = Config::load_from_str(
            "connection:\n  client_ip_address: 192.168.1.150\n  controller_ip_address: 192.168.1.100\n",
        )
        .unwrap();
        config.motion.cycles = cycles;
        config
    }

    fn robot(config: &Config) -> SimulatedRobot {
        SimulatedRobot::new(config.connection.clone(), config.simulator.clone())
    }

    #[test]
    fn test_full_session_stops_cleanly() {
        let config = config(20);
        let mut robot = robot(&config);
        let recorder = RecordingHandler::default();
        let mut session = ControlSession::new(config).with_event_handler(Box::new(recorder.clone()));

        let report = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(report.summary.cycles_completed, 20);
        assert_eq!(robot.link_state(), &LinkState::Stopped);
        // one extra state is received before the stop
        assert_eq!(robot.cycles_delivered(), 21);
        assert_eq!(robot.qos_profile(), Some(&session.config().qos));

        let events = recorder.events();
        assert_eq!(events.first().map(String::as_str), Some("sampling"));
        assert_eq!(events.last().map(String::as_str), Some("stopped: stop requested by client"));
        assert_eq!(events.iter().filter(|e| e.starts_with("switch")).count(), 19);
    }

    #[test]
    fn test_setup_failure_is_reported_as_network_failure() {
        let mut config = config(20);
        config.connection.is_secure = true;
        config.connection.certificate_path = Some("no-such-cert.pem".into());
        config.connection.private_key_path = Some("no-such-key.pem".into());
        let mut robot = robot(&config);
        let mut session = ControlSession::new(config);

        let err = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::Setup);
        assert!(err.to_string().starts_with("Setting up network failed"));
        assert_eq!(robot.link_state(), &LinkState::Idle);
        // QoS was still handed over
        assert!(robot.qos_profile().is_some());
    }

    #[test]
    fn test_start_failure_is_reported_as_channel_failure() {
        let config = config(20);
        let mut simulator = config.simulator.clone();
        simulator.home_position = vec![0.0; 3];
        let mut robot = SimulatedRobot::new(config.connection.clone(), simulator);
        let mut session = ControlSession::new(config);

        let err = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::StartControlling);
        assert!(err.to_string().starts_with("Opening control channel failed"));
        assert_eq!(err.return_code(), ReturnCode::Error);
        assert_eq!(robot.link_state(), &LinkState::Connected);
    }

    #[test]
    fn test_second_setup_is_refused() {
        let config = config(20);
        let mut robot = robot(&config);
        robot.setup().unwrap();
        let mut session = ControlSession::new(config);

        let err = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::Setup);
    }

    #[test]
    fn test_loop_failure_skips_stop() {
        let mut config = config(20);
        config.connection.receive_timeout_ms = 1;
        let mut robot = robot(&config).with_fault(SimFault { at_cycle: 5, kind: FaultKind::ReceiveTimeout });
        let mut session = ControlSession::new(config);

        let err = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::ControlLoop);
        assert_eq!(err.return_code(), ReturnCode::Timeout);
        assert_eq!(robot.link_state(), &LinkState::Controlling);
    }

    #[test]
    fn test_final_receive_failure() {
        let config = config(4);
        let mut robot = robot(&config).with_fault(SimFault { at_cycle: 4, kind: FaultKind::LinkLost });
        let mut session = ControlSession::new(config);

        let err = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err.stage(), SessionStage::FinalReceive);
        assert!(err.to_string().starts_with("Recv req before stop failed"));
    }

    #[test]
    fn test_interrupted_session_still_stops() {
        let config = config(1000);
        let mut robot = robot(&config);
        let mut session = ControlSession::new(config);

        let report = session
            .run(&mut robot, &mut TelemetrySink::disabled(), &AtomicBool::new(true))
            .unwrap();
        assert!(report.summary.interrupted);
        assert_eq!(robot.link_state(), &LinkState::Stopped);
    }

    #[derive(Default, Clone)]
    struct StageLog {
        stages: Arc<Mutex<Vec<(SessionStage, bool)>>>,
        cycles: Arc<Mutex<u64>>,
        summaries: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl TelemetryPublisher for StageLog {
        async fn publish_cycle(&self, _data: &CycleRecord) -> anyhow::Result<()> {
            *self.cycles.lock().unwrap() += 1;
            Ok(())
        }

        async fn publish_session(&self, data: &SessionEvent) -> anyhow::Result<()> {
            self.stages.lock().unwrap().push((data.stage, data.success));
            Ok(())
        }

        async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> anyhow::Result<()> {
            assert_eq!(topic, "summary");
            self.summaries.lock().unwrap().push(data.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_publishes_stage_events() {
        let mut config = config(30);
        config.telemetry.enabled = true;
        config.telemetry.publish_every = 10;
        let log = StageLog::default();
        let (mut sink, forwarder) = spawn_forwarder(&config.telemetry, Box::new(log.clone()));
        let mut robot = robot(&config);
        let mut session = ControlSession::new(config);

        let report = session.run(&mut robot, &mut sink, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.session_id, sink.session_id());
        assert_eq!(sink.dropped(), 0);
        drop(sink);
        forwarder.await.unwrap();

        let stages: Vec<SessionStage> = log.stages.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![
                SessionStage::Setup,
                SessionStage::QosProfile,
                SessionStage::RegisterHandler,
                SessionStage::StartControlling,
                SessionStage::ControlLoop,
                SessionStage::FinalReceive,
                SessionStage::StopControlling,
            ]
        );
        assert!(log.stages.lock().unwrap().iter().all(|(_, ok)| *ok));
        assert_eq!(*log.cycles.lock().unwrap(), 3);

        let summaries = log.summaries.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0]["cycles_completed"], 30);
        assert_eq!(summaries[0]["mode_switches"], report.summary.mode_switches);
        assert_eq!(summaries[0]["interrupted"], false);
    }
}
