//! Host platform detection
//!
//! The platform and architecture tokens are part of every cache key, so they
//! must be stable across the setup and post invocations on the same runner.

use crate::error::{SetupError, SetupResult};

/// Detected platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux - apt prerequisites, apt cache mirroring
    Linux,
    /// macOS - Homebrew prerequisites
    MacOS,
    /// Windows - zipped opam release
    Windows,
    /// Unsupported platform
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an `std::env::consts::OS` value to a platform
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Unsupported,
        }
    }

    /// Get a human-readable platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOS => "macOS",
            Platform::Windows => "Windows",
            Platform::Unsupported => "Unsupported",
        }
    }

    /// Token used inside cache keys
    pub fn key_name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOS => "macos",
            Platform::Windows => "windows",
            Platform::Unsupported => "unknown",
        }
    }

    pub fn is_linux(&self) -> bool {
        matches!(self, Platform::Linux)
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Fail on platforms we cannot provision
    pub fn ensure_supported(self) -> SetupResult<Self> {
        match self {
            Platform::Unsupported => Err(SetupError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            )),
            supported => Ok(supported),
        }
    }
}

/// Architecture token of the running binary (`x86_64`, `aarch64`, ...)
pub fn current_arch() -> &'static str {
    std::env::consts::ARCH
}
