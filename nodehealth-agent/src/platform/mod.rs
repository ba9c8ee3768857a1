//! Host platform classification
//!
//! Determines what kind of machine the node runs on so remediation can be
//! gated per platform:
//! - `Darwin` family → Mac
//! - `Linux` family → Raspberry Pi OS, Ubuntu or generic Linux, from `/etc/os-release`
//! - anything else → Unknown

use crate::error::{HealthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Distribution release metadata file
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Kind of host the node is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformKind {
    Mac,
    RPi,
    Ubuntu,
    Linux,
    Unknown,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlatformKind::Mac => "Mac",
            PlatformKind::RPi => "RPi",
            PlatformKind::Ubuntu => "Ubuntu",
            PlatformKind::Linux => "Linux",
            PlatformKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Source of host identity facts
pub trait HostIdentity {
    /// OS family name as reported by `uname -s` (e.g. "Darwin", "Linux")
    fn os_family(&self) -> Result<String>;

    /// Contents of the distribution release metadata file
    fn release_metadata(&self) -> Result<String>;
}

/// Reads identity from the running host
pub struct LocalHost;

impl HostIdentity for LocalHost {
    #[cfg(unix)]
    fn os_family(&self) -> Result<String> {
        let uts = nix::sys::utsname::uname().map_err(|e| HealthError::PlatformRead {
            what: "uname".to_string(),
            source: e.into(),
        })?;
        Ok(uts.sysname().to_string_lossy().to_string())
    }

    #[cfg(not(unix))]
    fn os_family(&self) -> Result<String> {
        Ok(match std::env::consts::OS {
            "windows" => "Windows".to_string(),
            other => other.to_string(),
        })
    }

    fn release_metadata(&self) -> Result<String> {
        read_release_file(Path::new(OS_RELEASE_PATH))
    }
}

pub fn read_release_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| HealthError::PlatformRead {
        what: path.display().to_string(),
        source: e,
    })
}

/// Classify the running host
pub fn classify() -> Result<PlatformKind> {
    classify_host(&LocalHost)
}

/// Classify from any identity source. The release file is only read for Linux.
pub fn classify_host(host: &dyn HostIdentity) -> Result<PlatformKind> {
    let family = host.os_family()?;
    let kind = match family.as_str() {
        "Darwin" => PlatformKind::Mac,
        "Linux" => classify_release(&host.release_metadata()?),
        _ => PlatformKind::Unknown,
    };

    debug!("Classified host (family {}) as {}", family, kind);
    Ok(kind)
}

/// Map Linux release metadata to a platform kind
pub fn classify_release(content: &str) -> PlatformKind {
    let lowered = content.to_lowercase();
    if lowered.contains("raspbian") {
        PlatformKind::RPi
    } else if lowered.contains("ubuntu") {
        PlatformKind::Ubuntu
    } else {
        PlatformKind::Linux
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct StaticHost {
        family: &'static str,
        release: Option<&'static str>,
    }

    impl HostIdentity for StaticHost {
        fn os_family(&self) -> Result<String> {
            Ok(self.family.to_string())
        }

        fn release_metadata(&self) -> Result<String> {
            self.release.map(str::to_string).ok_or_else(|| HealthError::PlatformRead {
                what: OS_RELEASE_PATH.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "missing"),
            })
        }
    }

    #[test]
    fn test_darwin_is_mac_without_reading_release() {
        let host = StaticHost { family: "Darwin", release: None };
        assert_eq!(classify_host(&host).unwrap(), PlatformKind::Mac);
    }

    #[test]
    fn test_raspbian_release() {
        let host = StaticHost {
            family: "Linux",
            release: Some("ID=raspbian\nNAME=Raspbian GNU/Linux"),
        };
        assert_eq!(classify_host(&host).unwrap(), PlatformKind::RPi);
    }

    #[test]
    fn test_ubuntu_match_is_case_insensitive() {
        assert_eq!(classify_release("NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\""), PlatformKind::Ubuntu);
        assert_eq!(classify_release("ID=UBUNTU"), PlatformKind::Ubuntu);
    }

    #[test]
    fn test_raspbian_wins_over_ubuntu() {
        assert_eq!(classify_release("ID=raspbian\nID_LIKE=ubuntu"), PlatformKind::RPi);
    }

    #[test]
    fn test_other_linux() {
        assert_eq!(classify_release("ID=fedora\nNAME=Fedora Linux"), PlatformKind::Linux);
        assert_eq!(classify_release(""), PlatformKind::Linux);
    }

    #[test]
    fn test_other_family_is_unknown() {
        let host = StaticHost { family: "FreeBSD", release: None };
        assert_eq!(classify_host(&host).unwrap(), PlatformKind::Unknown);
    }

    #[test]
    fn test_unreadable_release_fails() {
        let host = StaticHost { family: "Linux", release: None };
        assert!(matches!(classify_host(&host), Err(HealthError::PlatformRead { .. })));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let host = StaticHost { family: "Linux", release: Some("ID=ubuntu") };
        let first = classify_host(&host).unwrap();
        for _ in 0..5 {
            assert_eq!(classify_host(&host).unwrap(), first);
        }
    }

    #[test]
    fn test_local_host_classifies() {
        // Only Linux hosts need the release file, which may be absent in containers
        if let Ok(kind) = classify() {
            if cfg!(target_os = "macos") {
                assert_eq!(kind, PlatformKind::Mac);
            }
        }
    }
}
