use std::fmt;
use std::str::FromStr;

use crate::error::CollectError;

/// Target operating system, as named on the command line and in profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Rhel,
    Rocky,
    AlmaLinux,
    Fedora,
    Debian,
    Ubuntu,
}

/// Package manager family; selects the "last update" probe on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Rpm,
    Apt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Linux(PackageFamily),
    Windows,
}

impl Platform {
    pub const ALL: &'static [Platform] = &[
        Platform::Windows,
        Platform::Rhel,
        Platform::Rocky,
        Platform::AlmaLinux,
        Platform::Fedora,
        Platform::Debian,
        Platform::Ubuntu,
    ];

    pub fn family(self) -> Family {
        match self {
            Platform::Windows => Family::Windows,
            Platform::Rhel | Platform::Rocky | Platform::AlmaLinux | Platform::Fedora => {
                Family::Linux(PackageFamily::Rpm)
            }
            Platform::Debian | Platform::Ubuntu => Family::Linux(PackageFamily::Apt),
        }
    }

    pub fn is_windows(self) -> bool {
        matches!(self.family(), Family::Windows)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Rhel => "rhel",
            Platform::Rocky => "rocky",
            Platform::AlmaLinux => "almalinux",
            Platform::Fedora => "fedora",
            Platform::Debian => "debian",
            Platform::Ubuntu => "ubuntu",
        }
    }

    /// Comma-separated list of accepted identifiers, for help and error text.
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Platform {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| CollectError::UnsupportedPlatform(s.trim().to_string()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
