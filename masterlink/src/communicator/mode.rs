//! Operating modes of the link.

use std::fmt;

/// Mutually exclusive operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Command/response traffic; passthrough optional.
    #[default]
    Normal,
    /// Interactive CLI session on the master. Commands are rejected and
    /// unclaimed bytes go to the maintenance channel.
    Maintenance,
    /// The link belongs to the passthrough device. Commands are rejected and
    /// every inbound byte goes to the passthrough buffer unparsed.
    PassthroughOnly,
}

impl Mode {
    /// Whether synchronous commands are accepted.
    pub fn accepts_commands(self) -> bool {
        self == Self::Normal
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::PassthroughOnly => write!(f, "passthrough-only"),
        }
    }
}
