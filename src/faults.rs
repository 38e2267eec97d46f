//! Fault classification for test runs
//!
//! Controller messages that should fail a running test: communication
//! messages at fault level and runtime exceptions. Known-benign fault codes
//! can be ignored by pattern.

use crate::config::MonitorConfig;
use crate::messages::{RealtimeMessage, ReportLevel, RobotMessageKind};
use crate::Result;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Comm,
    RuntimeException,
}

/// A controller message that counts as a test failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("robot fault {}: {message}", .code.as_deref().unwrap_or("-"))]
pub struct RobotFault {
    pub kind: FaultKind,
    /// Error code in `{code}A{argument}` form, for comm faults
    pub code: Option<String>,
    pub message: String,
}

/// Decides which public messages are faults
#[derive(Debug, Clone, Default)]
pub struct FaultPolicy {
    ignored: Vec<Regex>,
}

impl FaultPolicy {
    /// Patterns must match a whole error code, e.g. `C4A\d+` or `210A3`
    pub fn new<S: AsRef<str>>(ignored: &[S]) -> Result<Self> {
        let ignored = ignored
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern.as_ref())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { ignored })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(&config.ignored_fault_codes)
    }

    pub fn is_ignored(&self, code: &str) -> bool {
        self.ignored.iter().any(|pattern| pattern.is_match(code))
    }

    pub fn check(&self, message: &RealtimeMessage) -> Option<RobotFault> {
        let RealtimeMessage::Robot(robot) = message else {
            return None;
        };

        match &robot.kind {
            RobotMessageKind::Comm(comm) if comm.level == ReportLevel::Fault => {
                let code = comm.error_code();
                if self.is_ignored(&code) {
                    return None;
                }
                Some(RobotFault {
                    kind: FaultKind::Comm,
                    message: format!("controller reported fault {}", code),
                    code: Some(code),
                })
            }
            RobotMessageKind::RuntimeException(exception) => Some(RobotFault {
                kind: FaultKind::RuntimeException,
                code: None,
                message: format!(
                    "{} (line {}, column {})",
                    exception.message, exception.line, exception.column
                ),
            }),
            _ => None,
        }
    }
}
