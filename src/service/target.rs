use crate::common::config::ConfigError;
use crate::service::process::{CoreSet, Priority};
use std::fmt;

const WINDOWS_EXE_SUFFIX: &str = ".exe";

/// Which of the two tiers a target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Prioritized processes.
    Good,
    /// Deprioritized processes.
    Bad,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Good => "good",
            Tier::Bad => "bad",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executable naming rules of a host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    exe_suffix: Option<&'static str>,
}

impl Platform {
    pub const UNIX: Platform = Platform { exe_suffix: None };
    pub const WINDOWS: Platform = Platform {
        exe_suffix: Some(WINDOWS_EXE_SUFFIX),
    };

    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::WINDOWS
        } else {
            Platform::UNIX
        }
    }

    /// Turn a user supplied name into the name the OS reports for the process.
    pub fn normalize(&self, raw: &str) -> Result<ImageName, ConfigError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ConfigError::MalformedName {
                name: raw.to_string(),
                reason: "name is empty",
            });
        }

        match self.exe_suffix {
            Some(suffix) if name.ends_with(suffix) => Ok(ImageName(name.to_string())),
            Some(suffix) => Ok(ImageName(format!("{}{}", name, suffix))),
            None if name.ends_with(WINDOWS_EXE_SUFFIX) => Err(ConfigError::MalformedName {
                name: name.to_string(),
                reason: "executable suffix is not used on this platform",
            }),
            None => Ok(ImageName(name.to_string())),
        }
    }
}

/// Normalized executable name; the identity of a target group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageName(String);

impl ImageName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settings enforced on every process of a target group. `None` fields are
/// left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredProfile {
    pub tier: Tier,
    pub priority: Option<Priority>,
    pub affinity: Option<CoreSet>,
}

impl DesiredProfile {
    pub fn new(tier: Tier, priority: Option<Priority>, affinity: Option<CoreSet>) -> Self {
        Self {
            tier,
            priority,
            affinity,
        }
    }
}
