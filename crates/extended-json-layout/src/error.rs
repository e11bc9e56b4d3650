// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can occur while building or running the JSON layout
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Unknown JSON adapter: {0}")]
    UnknownAdapter(String),

    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("Could not get hostname: {0}")]
    Hostname(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(String),

    #[error("Failed to serialize log event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write log event: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LayoutError::UnknownAdapter("com.example.Missing".to_string());
        assert_eq!(error.to_string(), "Unknown JSON adapter: com.example.Missing");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: LayoutError = io.into();
        assert!(matches!(error, LayoutError::Io(_)));
        assert!(error.to_string().contains("pipe closed"));
    }
}
