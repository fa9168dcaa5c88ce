//! Screen edges a panel can be docked to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// One of the four sides of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl Edge {
    /// Order in which edges are offered when auto-placing a new panel.
    pub const CANONICAL: [Edge; 4] = [Edge::Bottom, Edge::Left, Edge::Top, Edge::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Edge::Top => "top",
            Edge::Bottom => "bottom",
            Edge::Left => "left",
            Edge::Right => "right",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Edge {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Edge::Top),
            "bottom" => Ok(Edge::Bottom),
            "left" => Ok(Edge::Left),
            "right" => Ok(Edge::Right),
            other => Err(DomainError::InvalidFieldValue {
                field: "edge".to_string(),
                value: other.to_string(),
                expected: "top, bottom, left or right".to_string(),
            }),
        }
    }
}
