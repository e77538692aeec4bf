use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ValidationError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Frequency {
    Daily => "daily",
    Weekly => "weekly",
    AsNeeded => "as-needed",
});

impl Default for Frequency {
    fn default() -> Self {
        Self::Daily
    }
}

impl Frequency {
    /// Length of one reminder period in days. `None` for as-needed medicines,
    /// which are never reminded automatically.
    pub fn period_days(&self) -> Option<i64> {
        match self {
            Self::Daily => Some(1),
            Self::Weekly => Some(7),
            Self::AsNeeded => None,
        }
    }
}

// Result of one reminder attempt.
str_enum!(Outcome {
    Confirmed => "confirmed",
    Declined => "declined",
    TimedOut => "timeout",
});

str_enum!(TriggerPolicy {
    CatchUp => "catch_up",
    ExactMinute => "exact_minute",
});

str_enum!(ReminderPhase {
    Idle => "idle",
    Due => "due",
    InFlight => "in_flight",
    RetryPending => "retry_pending",
    Taken => "taken",
});
