//! Output sinks for realtime messages
//!
//! Provides a trait-based interface for handing decoded messages to any
//! consumer (console, log pipe, test reporter) without coupling the client
//! to one of them.

use crate::faults::RobotFault;
use crate::messages::RealtimeMessage;
use async_trait::async_trait;

/// Destination for messages read from a [`crate::MessageStream`]
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, message: &RealtimeMessage) -> anyhow::Result<()>;

    /// Optional: report a message classified as a fault
    async fn publish_fault(&self, fault: &RobotFault) -> anyhow::Result<()> {
        // Default implementation does nothing
        let _ = fault;
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Default)]
pub struct NoOpSink;

#[async_trait]
impl MessageSink for NoOpSink {
    async fn publish(&self, _message: &RealtimeMessage) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Prints one JSON document per message to stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    pub pretty_print: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    pub fn render(&self, message: &RealtimeMessage) -> anyhow::Result<String> {
        let json = if self.pretty_print {
            serde_json::to_string_pretty(message)?
        } else {
            serde_json::to_string(message)?
        };
        Ok(json)
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn publish(&self, message: &RealtimeMessage) -> anyhow::Result<()> {
        println!("{}", self.render(message)?);
        Ok(())
    }

    async fn publish_fault(&self, fault: &RobotFault) -> anyhow::Result<()> {
        let json = serde_json::json!({ "type": "Fault", "fault": fault });
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            println!("{}", json);
        }
        Ok(())
    }
}
