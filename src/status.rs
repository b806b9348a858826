use std::fmt;

/// Human-readable pipeline status for whatever UI sits on top
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Initializing,
    Ready,
    Degraded,
    Error(String),
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initializing => write!(f, "initializing"),
            Status::Ready => write!(f, "segmentation ready"),
            Status::Degraded => write!(f, "segmentation degraded: heuristic fallback"),
            Status::Error(msg) => write!(f, "processing error: {msg}"),
            Status::Stopped => write!(f, "stopped"),
        }
    }
}

/// Fire-and-forget notification channel
pub trait StatusSink {
    fn notify(&self, status: &Status);
}

/// Writes status changes to the log
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn notify(&self, status: &Status) {
        match status {
            Status::Error(_) | Status::Degraded => tracing::warn!("Status: {}", status),
            _ => tracing::info!("Status: {}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_naturally() {
        assert_eq!(Status::Initializing.to_string(), "initializing");
        assert_eq!(
            Status::Error("camera unplugged".into()).to_string(),
            "processing error: camera unplugged"
        );
    }
}
