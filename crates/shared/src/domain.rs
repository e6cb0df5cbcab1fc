use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::UnknownValue;

/// Stable identifier of one physical intersection, e.g. `TL_001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SignalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SignalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Generates the string conversions shared by every wire-level enum: a
/// lowercase `as_str`, `Display`, and a case-insensitive `FromStr` that also
/// accepts the listed aliases.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let normalized = raw.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(UnknownValue::new($kind, raw)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Red,
    Yellow,
    Green,
}

wire_enum!(Phase, "phase", {
    Red => "red",
    Yellow => "yellow",
    Green => "green",
});

/// Control mode of a signal. `Emergency` is the mode the server variant
/// called `smart`; both names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Auto,
    Manual,
    #[serde(alias = "smart")]
    Emergency,
}

wire_enum!(Mode, "mode", {
    Auto => "auto",
    Manual => "manual",
    Emergency => "emergency" | "smart",
});

impl Mode {
    /// Whether ticks advance the countdown in this mode.
    pub fn runs_on_timer(self) -> bool {
        !matches!(self, Mode::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

wire_enum!(SignalStatus, "status", {
    Active => "active",
    Inactive => "inactive",
    Maintenance => "maintenance",
});

/// What caused a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    Timer,
    Manual,
}

wire_enum!(ChangeCause, "cause", {
    Timer => "timer",
    Manual => "manual",
});

/// Descriptive data about where a signal is installed. Never consulted by
/// the phase logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSite {
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl SignalSite {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            location: name.clone(),
            name,
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}
