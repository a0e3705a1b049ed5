//! The closed behavioral dimension set
//!
//! Six fixed axes scored 1-10. The set is closed: provider output naming any
//! other dimension is rejected, and directive emission always follows the
//! canonical order below so composed prompts are deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score scale bounds shared by validation and prompt rendering
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

/// A behavioral axis scored 1-10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Patience,
    #[serde(rename = "Technical Depth")]
    TechnicalDepth,
    #[serde(rename = "Frustration Tolerance")]
    FrustrationTolerance,
    Verbosity,
    Politeness,
    #[serde(rename = "Engagement Level")]
    EngagementLevel,
}

impl Dimension {
    /// Canonical ordering used everywhere dimensions are iterated
    pub const ALL: [Dimension; 6] = [
        Dimension::Patience,
        Dimension::TechnicalDepth,
        Dimension::FrustrationTolerance,
        Dimension::Verbosity,
        Dimension::Politeness,
        Dimension::EngagementLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Patience => "Patience",
            Dimension::TechnicalDepth => "Technical Depth",
            Dimension::FrustrationTolerance => "Frustration Tolerance",
            Dimension::Verbosity => "Verbosity",
            Dimension::Politeness => "Politeness",
            Dimension::EngagementLevel => "Engagement Level",
        }
    }

    /// Parse a dimension name, tolerating case differences from the provider
    pub fn parse(s: &str) -> Option<Dimension> {
        let needle = s.trim();
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(needle))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_fixed() {
        let names: Vec<&str> = Dimension::ALL.iter().map(|d| d.as_str()).collect();
        assert_eq!(
            names,
            [
                "Patience",
                "Technical Depth",
                "Frustration Tolerance",
                "Verbosity",
                "Politeness",
                "Engagement Level"
            ]
        );
    }

    #[test]
    fn parse_round_trips_and_tolerates_case() {
        for dim in Dimension::ALL {
            assert_eq!(Dimension::parse(dim.as_str()), Some(dim));
        }
        assert_eq!(
            Dimension::parse("technical depth"),
            Some(Dimension::TechnicalDepth)
        );
        assert_eq!(Dimension::parse("Charisma"), None);
    }

    #[test]
    fn serde_uses_display_names() {
        let json = serde_json::to_string(&Dimension::EngagementLevel).unwrap();
        assert_eq!(json, "\"Engagement Level\"");
        let back: Dimension = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Dimension::EngagementLevel);
    }
}
