//! Guide directions and the small enums that qualify them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of actuator a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuatorKind {
    /// Slow, unlimited-range mount driven by timed pulses
    Mount,
    /// Fast, limited-range step guider (adaptive-optics unit)
    StepGuider,
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorKind::Mount => write!(f, "Mount"),
            ActuatorKind::StepGuider => write!(f, "StepGuider"),
        }
    }
}

/// Actuator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// RA for a mount, left/right for a step guider
    X,
    /// Dec for a mount, up/down for a step guider
    Y,
}

/// Direction of a single actuator move
///
/// Mount and step guider share the same variants: North is Up, South is
/// Down, East is Right and West is Left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuideDirection {
    Up,
    Down,
    Right,
    Left,
    None,
}

impl GuideDirection {
    pub const NORTH: GuideDirection = GuideDirection::Up;
    pub const SOUTH: GuideDirection = GuideDirection::Down;
    pub const EAST: GuideDirection = GuideDirection::Right;
    pub const WEST: GuideDirection = GuideDirection::Left;

    /// Axis this direction moves, `None` for [`GuideDirection::None`]
    pub fn axis(self) -> Option<Axis> {
        match self {
            GuideDirection::Up | GuideDirection::Down => Some(Axis::Y),
            GuideDirection::Right | GuideDirection::Left => Some(Axis::X),
            GuideDirection::None => None,
        }
    }

    pub fn opposite(self) -> GuideDirection {
        match self {
            GuideDirection::Up => GuideDirection::Down,
            GuideDirection::Down => GuideDirection::Up,
            GuideDirection::Right => GuideDirection::Left,
            GuideDirection::Left => GuideDirection::Right,
            GuideDirection::None => GuideDirection::None,
        }
    }

    /// Log name; mounts use compass names
    pub fn name(self, kind: ActuatorKind) -> &'static str {
        match (kind, self) {
            (ActuatorKind::Mount, GuideDirection::Up) => "North",
            (ActuatorKind::Mount, GuideDirection::Down) => "South",
            (ActuatorKind::Mount, GuideDirection::Right) => "East",
            (ActuatorKind::Mount, GuideDirection::Left) => "West",
            (ActuatorKind::StepGuider, GuideDirection::Up) => "Up",
            (ActuatorKind::StepGuider, GuideDirection::Down) => "Down",
            (ActuatorKind::StepGuider, GuideDirection::Right) => "Right",
            (ActuatorKind::StepGuider, GuideDirection::Left) => "Left",
            (_, GuideDirection::None) => "None",
        }
    }

    /// One-character code used in compact log lines
    pub fn code(self) -> char {
        match self {
            GuideDirection::Up => 'U',
            GuideDirection::Down => 'D',
            GuideDirection::Right => 'R',
            GuideDirection::Left => 'L',
            GuideDirection::None => '-',
        }
    }
}

/// Declination guiding policy for normal (non-calibration) moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecGuideMode {
    /// No Dec guiding; Dec calibration is skipped
    None,
    /// Guide both directions
    #[default]
    Auto,
    /// Only north corrections are sent
    North,
    /// Only south corrections are sent
    South,
}

impl DecGuideMode {
    /// Whether a normal move in `direction` is vetoed by this mode
    pub fn vetoes(self, direction: GuideDirection) -> bool {
        match self {
            DecGuideMode::None => true,
            DecGuideMode::Auto => false,
            DecGuideMode::North => direction == GuideDirection::SOUTH,
            DecGuideMode::South => direction == GuideDirection::NORTH,
        }
    }
}

impl fmt::Display for DecGuideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DecGuideMode::None => "off",
            DecGuideMode::Auto => "Auto",
            DecGuideMode::North => "north",
            DecGuideMode::South => "south",
        };
        f.write_str(label)
    }
}

/// Side of the meridian the telescope tube is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PierSide {
    #[default]
    Unknown,
    East,
    West,
}

impl PierSide {
    pub fn opposite(self) -> PierSide {
        match self {
            PierSide::East => PierSide::West,
            PierSide::West => PierSide::East,
            PierSide::Unknown => PierSide::Unknown,
        }
    }
}
