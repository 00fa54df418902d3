//! Build targets the engine can be compiled for.

use crate::config::EngineConfig;
use std::fmt;

/// A platform the engine binary is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformTarget {
    LinuxX86_64,
    WindowsX86_64,
    MacosAarch64,
    MacosX86_64,
}

impl PlatformTarget {
    pub const ALL: [PlatformTarget; 4] = [
        PlatformTarget::LinuxX86_64,
        PlatformTarget::WindowsX86_64,
        PlatformTarget::MacosAarch64,
        PlatformTarget::MacosX86_64,
    ];

    /// Target matching the platform this crate was built for, if supported.
    pub fn host() -> Option<Self> {
        if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            Some(PlatformTarget::LinuxX86_64)
        } else if cfg!(all(target_os = "windows", target_arch = "x86_64")) {
            Some(PlatformTarget::WindowsX86_64)
        } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Some(PlatformTarget::MacosAarch64)
        } else if cfg!(all(target_os = "macos", target_arch = "x86_64")) {
            Some(PlatformTarget::MacosX86_64)
        } else {
            None
        }
    }

    /// Target the engine is deployed to.
    pub fn deployment() -> Self {
        PlatformTarget::LinuxX86_64
    }

    /// Host and deployment targets, deduplicated.
    pub fn host_and_deployment() -> Vec<Self> {
        let mut targets: Vec<Self> = Self::host().into_iter().collect();
        if !targets.contains(&Self::deployment()) {
            targets.push(Self::deployment());
        }
        targets
    }

    pub fn os(&self) -> &'static str {
        match self {
            PlatformTarget::LinuxX86_64 => "linux",
            PlatformTarget::WindowsX86_64 => "windows",
            PlatformTarget::MacosAarch64 | PlatformTarget::MacosX86_64 => "macos",
        }
    }

    pub fn arch(&self) -> &'static str {
        match self {
            PlatformTarget::MacosAarch64 => "aarch64",
            _ => "x86_64",
        }
    }

    pub fn triple(&self) -> &'static str {
        match self {
            PlatformTarget::LinuxX86_64 => "x86_64-unknown-linux-gnu",
            PlatformTarget::WindowsX86_64 => "x86_64-pc-windows-msvc",
            PlatformTarget::MacosAarch64 => "aarch64-apple-darwin",
            PlatformTarget::MacosX86_64 => "x86_64-apple-darwin",
        }
    }

    /// Installed file name in the bin directory.
    pub fn binary_name(&self) -> &'static str {
        match self {
            PlatformTarget::LinuxX86_64 => "lightning-search",
            PlatformTarget::WindowsX86_64 => "lightning-search.exe",
            PlatformTarget::MacosAarch64 => "lightning-search-darwin-arm64",
            PlatformTarget::MacosX86_64 => "lightning-search-darwin",
        }
    }

    /// File name cargo produces under `<target_dir>/<triple>/release/`.
    pub fn artifact_name(&self) -> String {
        match self {
            PlatformTarget::WindowsX86_64 => format!("{}.exe", EngineConfig::BINARY_NAME),
            _ => EngineConfig::BINARY_NAME.to_string(),
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os(), self.arch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_binary_names_are_distinct() {
        let names: HashSet<_> = PlatformTarget::ALL.iter().map(|t| t.binary_name()).collect();
        assert_eq!(names.len(), PlatformTarget::ALL.len());
    }

    #[test]
    fn test_deployment_always_included() {
        let targets = PlatformTarget::host_and_deployment();
        assert!(targets.contains(&PlatformTarget::deployment()));
        let unique: HashSet<_> = targets.iter().collect();
        assert_eq!(unique.len(), targets.len());
    }

    #[test]
    fn test_display_and_artifacts() {
        assert_eq!(PlatformTarget::WindowsX86_64.to_string(), "windows/x86_64");
        assert_eq!(
            PlatformTarget::WindowsX86_64.artifact_name(),
            "lightning-search.exe"
        );
        assert_eq!(PlatformTarget::MacosAarch64.artifact_name(), "lightning-search");
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn test_host_on_linux() {
        assert_eq!(PlatformTarget::host(), Some(PlatformTarget::LinuxX86_64));
    }
}
