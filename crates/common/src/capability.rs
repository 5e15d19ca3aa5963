//! The closed vocabulary of privileged operation classes.
//!
//! Every privileged local operation a plugin performs is gated by exactly
//! one of these capabilities. The set is closed: manifests naming anything
//! else fail validation before the plugin is ever constructed.

use std::{collections::BTreeSet, fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// A named privileged operation class, written `domain:operation` on the
/// wire and in manifests (e.g. `file:read`, `system:execute`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Capability {
    FileRead,
    FileWrite,
    FileDelete,
    NetworkHttp,
    NetworkWebsocket,
    SystemExecute,
    HardwareSerial,
    HardwareUsb,
    AppLaunch,
    ClipboardRead,
    ClipboardWrite,
}

impl Capability {
    /// All variants, for iteration and validation messages.
    pub const ALL: &'static [Capability] = &[
        Self::FileRead,
        Self::FileWrite,
        Self::FileDelete,
        Self::NetworkHttp,
        Self::NetworkWebsocket,
        Self::SystemExecute,
        Self::HardwareSerial,
        Self::HardwareUsb,
        Self::AppLaunch,
        Self::ClipboardRead,
        Self::ClipboardWrite,
    ];

    /// The canonical `domain:operation` string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file:read",
            Self::FileWrite => "file:write",
            Self::FileDelete => "file:delete",
            Self::NetworkHttp => "network:http",
            Self::NetworkWebsocket => "network:websocket",
            Self::SystemExecute => "system:execute",
            Self::HardwareSerial => "hardware:serial",
            Self::HardwareUsb => "hardware:usb",
            Self::AppLaunch => "app:launch",
            Self::ClipboardRead => "clipboard:read",
            Self::ClipboardWrite => "clipboard:write",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that names no capability in the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability `{0}`")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

impl TryFrom<String> for Capability {
    type Error = UnknownCapability;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.as_str().to_string()
    }
}

/// The declared permission ceiling of a plugin, fixed at load time.
pub type CapabilitySet = BTreeSet<Capability>;

/// Parse a manifest's permission strings into a set, rejecting anything
/// outside the closed vocabulary.
pub fn parse_capability_list<S: AsRef<str>>(
    raw: &[S],
) -> Result<CapabilitySet, UnknownCapability> {
    raw.iter().map(|s| s.as_ref().parse()).collect()
}
