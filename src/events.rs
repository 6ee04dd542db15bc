//! Controller event callbacks

use tracing::{debug, error, info, warn};

/// Callbacks fired by a [`Robot`](crate::Robot) on control link events
///
/// All methods default to doing nothing, so implementors only override
/// the events they care about.
pub trait EventHandler: Send {
    /// Control channel is open and the controller started sampling
    fn on_sampling(&mut self) {}

    fn on_control_mode_switch(&mut self, reason: &str) {
        let _ = reason;
    }

    fn on_stopped(&mut self, reason: &str) {
        let _ = reason;
    }

    fn on_error(&mut self, reason: &str) {
        let _ = reason;
    }
}

/// Event handler that reports every callback through the log
#[derive(Debug, Default, Clone)]
pub struct ControlEventHandler;

impl ControlEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl EventHandler for ControlEventHandler {
    fn on_sampling(&mut self) {
        info!("External control started, controller is sampling");
    }

    fn on_control_mode_switch(&mut self, reason: &str) {
        debug!("Control mode switched: {}", reason);
    }

    fn on_stopped(&mut self, reason: &str) {
        warn!("External control stopped: {}", reason);
    }

    fn on_error(&mut self, reason: &str) {
        error!("External control error: {}", reason);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records callbacks so tests can assert on what a robot reported
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingHandler {
        pub events: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingHandler {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventHandler for RecordingHandler {
        fn on_sampling(&mut self) {
            self.events.lock().unwrap().push("sampling".to_string());
        }

        fn on_control_mode_switch(&mut self, reason: &str) {
            self.events.lock().unwrap().push(format!("switch: {}", reason));
        }

        fn on_stopped(&mut self, reason: &str) {
            self.events.lock().unwrap().push(format!("stopped: {}", reason));
        }

        fn on_error(&mut self, reason: &str) {
            self.events.lock().unwrap().push(format!("error: {}", reason));
        }
    }

    struct Silent;
    impl EventHandler for Silent {}

    #[test]
    fn test_default_callbacks_are_noops() {
        let mut handler: Box<dyn EventHandler> = Box::new(Silent);
        handler.on_sampling();
        handler.on_control_mode_switch("x");
        handler.on_stopped("x");
        handler.on_error("x");
    }

    #[test]
    fn test_recording_handler_shares_log() {
        let recorder = RecordingHandler::default();
        let mut boxed: Box<dyn EventHandler> = Box::new(recorder.clone());
        boxed.on_sampling();
        boxed.on_stopped("done");
        assert_eq!(recorder.events(), vec!["sampling", "stopped: done"]);
    }
}
