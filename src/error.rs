use std::path::PathBuf;

use thiserror::Error;

/// serial line faults
///
/// an empty or short answer is not an error (it decodes to an absent
/// reading); these variants mean the port itself is gone.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port status error: {0}")]
    Status(#[from] tokio_serial::Error),
    #[error("serial port already closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("publish endpoint answered {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write archive file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("polling.interval_seconds must be at least 1")]
    ZeroInterval,
    #[error("serial.settle_ms must be greater than 0")]
    ZeroSettle,
    #[error("rotation.period_hours must be greater than 0")]
    ZeroRotationPeriod,
    #[error("rotation.period_hours must be at most {0}")]
    RotationPeriodTooLong(u64),
    #[error("publish.enabled is set but publish.url is empty")]
    MissingPublishUrl,
}
