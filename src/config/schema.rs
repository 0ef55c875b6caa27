//! Configuration schema definitions.
//!
//! This module defines the tunables of the backend layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for backend access.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BackendOptions {
    /// Stall detection for HTTP-based backends.
    pub watchdog: WatchdogConfig,

    /// Bandwidth limits handed to rate-limited backends.
    pub limits: LimitConfig,

    /// HTTP client settings.
    pub transport: TransportConfig,
}

/// Watchdog configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Cancel a request after this many seconds without upload or download progress.
    pub idle_timeout_secs: u64,

    /// Maximum bytes passed through per body read.
    pub chunk_size: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            chunk_size: 128 * 1024,
        }
    }
}

/// Bandwidth limits in KiB/s. Zero means unlimited.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LimitConfig {
    pub upload_kib: u64,
    pub download_kib: u64,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// How long an idle pooled connection is kept, in seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            pool_idle_timeout_secs: 90,
        }
    }
}
