//! Value types shared by the connection and gesture layers

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Identifier of one simultaneous touch point
pub type ContactId = u32;

/// Pressure used when a gesture does not specify one
pub const DEFAULT_PRESSURE: u32 = 100;

/// A coordinate in minitouch device space.
///
/// Device space is bounded by [`ConnectionCapabilities::max_x`] and
/// [`ConnectionCapabilities::max_y`], which usually differ from the display
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = String;

    /// Parses `"x,y"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("Expected `x,y`, got `{}`", s))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| format!("Invalid x coordinate in `{}`", s))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| format!("Invalid y coordinate in `{}`", s))?;
        Ok(Self { x, y })
    }
}

/// Touch capabilities announced by minitouch when a connection opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionCapabilities {
    /// Maximum number of simultaneous contacts
    pub max_contacts: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub max_pressure: u32,
    /// Process id of minitouch on the device
    pub pid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_str() {
        assert_eq!("400,600".parse::<Point>().unwrap(), Point::new(400, 600));
        assert_eq!(" 7 , -3 ".parse::<Point>().unwrap(), Point::new(7, -3));
    }

    #[test]
    fn test_point_from_str_rejects_garbage() {
        assert!("400".parse::<Point>().is_err());
        assert!("a,1".parse::<Point>().is_err());
        assert!("1,".parse::<Point>().is_err());
    }

    #[test]
    fn test_point_display_matches_parse_format() {
        let point = Point::from((12, 34));
        assert_eq!(point.to_string(), "12,34");
    }
}
