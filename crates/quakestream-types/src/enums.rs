//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Intensity scale
// ---------------------------------------------------------------------------

/// Discrete seismic intensity class derived from peak ground acceleration.
///
/// Ten ordered classes from `0` to `7`, with levels 5 and 6 split into a
/// weak (`-`) and strong (`+`) sub-level. Serialized as the display label.
/// The PGA thresholds live in `quakestream_core::intensity`, the only place
/// a class may be derived.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum IntensityClass {
    /// Not felt.
    #[default]
    #[serde(rename = "0")]
    Zero,
    /// Felt by a few people at rest.
    #[serde(rename = "1")]
    One,
    /// Felt by most people at rest.
    #[serde(rename = "2")]
    Two,
    /// Felt by almost everyone; hanging objects swing.
    #[serde(rename = "3")]
    Three,
    /// Unstable objects topple.
    #[serde(rename = "4")]
    Four,
    /// Level 5, weak.
    #[serde(rename = "5-")]
    FiveWeak,
    /// Level 5, strong.
    #[serde(rename = "5+")]
    FiveStrong,
    /// Level 6, weak.
    #[serde(rename = "6-")]
    SixWeak,
    /// Level 6, strong.
    #[serde(rename = "6+")]
    SixStrong,
    /// Severe shaking.
    #[serde(rename = "7")]
    Seven,
}

impl IntensityClass {
    /// All classes in ascending order.
    pub const ALL: [Self; 10] = [
        Self::Zero,
        Self::One,
        Self::Two,
        Self::Three,
        Self::Four,
        Self::FiveWeak,
        Self::FiveStrong,
        Self::SixWeak,
        Self::SixStrong,
        Self::Seven,
    ];

    /// Display label (`"0"` .. `"7"`, `"5-"`, `"5+"`, `"6-"`, `"6+"`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::FiveWeak => "5-",
            Self::FiveStrong => "5+",
            Self::SixWeak => "6-",
            Self::SixStrong => "6+",
            Self::Seven => "7",
        }
    }

    /// Numeric level for sorting and comparison across sub-levels.
    ///
    /// Weak sub-levels sit a quarter below the integer level and strong
    /// sub-levels a quarter above it (`5-` is 4.75, `6+` is 6.25).
    pub const fn level(self) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::Two => 2.0,
            Self::Three => 3.0,
            Self::Four => 4.0,
            Self::FiveWeak => 4.75,
            Self::FiveStrong => 5.25,
            Self::SixWeak => 5.75,
            Self::SixStrong => 6.25,
            Self::Seven => 7.0,
        }
    }

    /// Parse a display label back into a class.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.label() == label)
    }
}

impl core::fmt::Display for IntensityClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}
