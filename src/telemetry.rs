//! Telemetry abstraction for control sessions
//!
//! The control loop must never block on I/O, so it hands records to a
//! [`TelemetrySink`] which forwards them over a bounded channel to an async
//! task driving a [`TelemetryPublisher`]. Records that do not fit in the
//! channel are dropped and counted.

use crate::{
    config::TelemetryConfig,
    json_output::{CycleRecord, SessionEvent, SessionStage},
    motion::MotionState,
};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Trait for publishing control session telemetry
///
/// This allows the client to be used with any telemetry backend
/// without being coupled to specific transport mechanisms.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Publish one sampled control cycle
    async fn publish_cycle(&self, data: &CycleRecord) -> anyhow::Result<()>;

    /// Publish a session lifecycle event
    async fn publish_session(&self, data: &SessionEvent) -> anyhow::Result<()>;

    /// Optional: Publish custom telemetry data
    async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        let _ = (topic, data);
        Ok(())
    }
}

/// No-operation telemetry publisher
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl TelemetryPublisher for NoOpTelemetry {
    async fn publish_cycle(&self, _data: &CycleRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish_session(&self, _data: &SessionEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Console telemetry publisher
///
/// Prints all telemetry data to stdout in JSON format.
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    fn render<T: serde::Serialize>(&self, data: &T) -> anyhow::Result<String> {
        let text = if self.pretty_print {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(text)
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryPublisher for ConsoleTelemetry {
    async fn publish_cycle(&self, data: &CycleRecord) -> anyhow::Result<()> {
        println!("{}", self.render(data)?);
        Ok(())
    }

    async fn publish_session(&self, data: &SessionEvent) -> anyhow::Result<()> {
        println!("{}", self.render(data)?);
        Ok(())
    }

    async fn publish_custom(&self, topic: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        println!("[{}] {}", topic, self.render(data)?);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum TelemetryMessage {
    Cycle(CycleRecord),
    Session(SessionEvent),
    Custom { topic: String, data: serde_json::Value },
}

/// Non-blocking producer side used from the control loop
pub struct TelemetrySink {
    sender: Option<mpsc::Sender<TelemetryMessage>>,
    session_id: Uuid,
    publish_every: u64,
    decimal_places: u32,
    dropped: u64,
}

impl TelemetrySink {
    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self {
            sender: None,
            session_id: Uuid::new_v4(),
            publish_every: 1,
            decimal_places: 4,
            dropped: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Records lost because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Sample a cycle, keeping one in every `publish_every`
    pub fn record_cycle(&mut self, counter: u64, state: &MotionState, commanded: &[f64]) {
        if self.sender.is_none() || counter % self.publish_every != 0 {
            return;
        }
        let record = CycleRecord::new_rounded(self.session_id, counter, state, commanded, self.decimal_places);
        self.offer(TelemetryMessage::Cycle(record));
    }

    pub fn record_session(&mut self, stage: SessionStage, success: bool, message: &str) {
        if self.sender.is_none() {
            return;
        }
        let event = SessionEvent::new(self.session_id, stage, success, message);
        self.offer(TelemetryMessage::Session(event));
    }

    /// Queue a free-form record under `topic`
    pub fn record_custom(&mut self, topic: &str, data: serde_json::Value) {
        if self.sender.is_none() {
            return;
        }
        self.offer(TelemetryMessage::Custom {
            topic: topic.to_string(),
            data,
        });
    }

    fn offer(&mut self, message: TelemetryMessage) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                warn!("Telemetry forwarder has stopped, disabling telemetry");
                self.sender = None;
            }
        }
    }
}

/// Spawn the async forwarder and return the loop-side sink
///
/// Must be called from within a tokio runtime. The forwarder ends once the
/// sink is dropped and returns the number of records it published.
pub fn spawn_forwarder(
    config: &TelemetryConfig,
    publisher: Box<dyn TelemetryPublisher>,
) -> (TelemetrySink, JoinHandle<u64>) {
    let (sender, mut receiver) = mpsc::channel(config.channel_capacity.max(1));
    let sink = TelemetrySink {
        sender: Some(sender),
        session_id: Uuid::new_v4(),
        publish_every: u64::from(config.publish_every.max(1)),
        decimal_places: config.decimal_places(),
        dropped: 0,
    };

    let handle = tokio::spawn(async move {
        let mut published = 0u64;
        while let Some(message) = receiver.recv().await {
            let result = match &message {
                TelemetryMessage::Cycle(record) => publisher.publish_cycle(record).await,
                TelemetryMessage::Session(event) => publisher.publish_session(event).await,
                TelemetryMessage::Custom { topic, data } => publisher.publish_custom(topic, data).await,
            };
            match result {
                Ok(()) => published += 1,
                Err(e) => warn!("Telemetry publish failed: {}", e),
            }
        }
        debug!("Telemetry forwarder finished after {} records", published);
        published
    });

    (sink, handle)
}
