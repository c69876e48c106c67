//! High level gestures built from command batches
//!
//! This module provides the [`GestureEngine`] struct, which turns taps and
//! swipes into sequences of [`CommandBuilder`] batches published through a
//! [`CommandSink`].
//!
//! Sequencing rules:
//!
//! - a tap is a single batch: every contact goes down, optionally holds,
//!   then every contact goes up;
//! - a swipe flushes the press, each move and the release as separate
//!   batches so real time passes between points;
//! - a smooth swipe interpolates extra points along each segment and swipes
//!   through every segment separately.
//!
//! Nothing is retried. If a publish fails the remaining steps are skipped
//! and any contact already down stays down on the device.

use std::time::Duration;

pub use minitouch_config::MAX_SMOOTH_PARTS;

use crate::builder::CommandBuilder;
use crate::connection::CommandSink;
use crate::error::{MinitouchError, Result};
use crate::types::{ContactId, Point, DEFAULT_PRESSURE};

/// Interpolation steps per segment used when none is configured
pub const DEFAULT_SMOOTH_PARTS: u32 = 10;

/// Contact used for every swipe
const SWIPE_CONTACT: ContactId = 0;

/// Options for [`GestureEngine::tap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOptions {
    pub pressure: u32,
    /// Hold time in milliseconds before releasing
    pub duration: Option<u64>,
    /// Leave the contacts down so a following swipe can continue from them
    pub no_up: bool,
}

impl Default for TapOptions {
    fn default() -> Self {
        Self {
            pressure: DEFAULT_PRESSURE,
            duration: None,
            no_up: false,
        }
    }
}

/// Options for [`GestureEngine::swipe`] and [`GestureEngine::smooth_swipe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOptions {
    pub pressure: u32,
    /// Pause in milliseconds after each move
    pub duration: Option<u64>,
    /// The contact is already down (e.g. from a `no_up` tap)
    pub no_down: bool,
    /// Leave the contact down at the last point
    pub no_up: bool,
}

impl Default for SwipeOptions {
    fn default() -> Self {
        Self {
            pressure: DEFAULT_PRESSURE,
            duration: None,
            no_down: false,
            no_up: false,
        }
    }
}

/// Translates gestures into published command batches
#[derive(Debug)]
pub struct GestureEngine<S> {
    sink: S,
    builder: CommandBuilder,
}

impl<S: CommandSink> GestureEngine<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            builder: CommandBuilder::new(),
        }
    }

    pub fn with_settle_delay(sink: S, settle_delay: Duration) -> Self {
        Self {
            sink,
            builder: CommandBuilder::with_settle_delay(settle_delay),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn publish(&mut self) -> Result<()> {
        self.builder.publish(&mut self.sink).map(drop)
    }

    /// Touch every point at once, contact ids `0..points.len()`.
    ///
    /// An empty `points` slice publishes a lone commit.
    pub fn tap(&mut self, points: &[Point], options: TapOptions) -> Result<()> {
        tracing::debug!(points = points.len(), ?options, "tap");

        for (contact, point) in (0..).zip(points) {
            self.builder
                .press(contact, point.x, point.y, options.pressure);
        }
        self.builder.commit();

        if let Some(ms) = options.duration {
            self.builder.wait(ms).commit();
        }

        if !options.no_up {
            for (contact, _) in (0..).zip(points) {
                self.builder.release(contact);
            }
        }

        self.publish()
    }

    /// Drag contact 0 through `points`.
    ///
    /// Unless `no_down` is set the first point is where the contact goes
    /// down; every remaining point is a separately published move.
    ///
    /// # Errors
    ///
    /// Returns `MinitouchError::InvalidArgument` without touching the sink if
    /// `points` is empty and the contact has to be pressed.
    pub fn swipe(&mut self, points: &[Point], options: SwipeOptions) -> Result<()> {
        tracing::debug!(points = points.len(), ?options, "swipe");

        let moves = if options.no_down {
            points
        } else {
            let (first, rest) = points.split_first().ok_or_else(|| {
                MinitouchError::invalid_argument("swipe needs at least one point to press")
            })?;
            self.builder
                .press(SWIPE_CONTACT, first.x, first.y, options.pressure)
                .commit();
            self.publish()?;
            rest
        };

        for point in moves {
            self.builder
                .move_to(SWIPE_CONTACT, point.x, point.y, options.pressure);
            if let Some(ms) = options.duration {
                self.builder.wait(ms);
            }
            self.builder.commit();
            self.publish()?;
        }

        if !options.no_up {
            self.builder.release(SWIPE_CONTACT).commit();
            self.publish()?;
        }

        Ok(())
    }

    /// Swipe every segment of `points` separately, each through `part`
    /// interpolated steps.
    ///
    /// `no_down` and `no_up` apply to every segment swipe, so by default the
    /// contact lifts at each inner point. Fewer than two points are swiped
    /// as given.
    ///
    /// # Errors
    ///
    /// Returns `MinitouchError::InvalidArgument` if `part` is zero or above
    /// [`MAX_SMOOTH_PARTS`], plus anything [`swipe`](Self::swipe) returns.
    pub fn smooth_swipe(&mut self, points: &[Point], options: SwipeOptions, part: u32) -> Result<()> {
        check_part(part)?;
        tracing::debug!(points = points.len(), part, "smooth swipe");

        if points.len() < 2 {
            return self.swipe(points, options);
        }
        for segment in points.windows(2) {
            let path = interpolate(segment[0], segment[1], part)?;
            self.swipe(&path, options)?;
        }
        Ok(())
    }
}

fn check_part(part: u32) -> Result<()> {
    if part == 0 || part > MAX_SMOOTH_PARTS {
        return Err(MinitouchError::invalid_argument(format!(
            "smooth swipe part must be between 1 and {}, got {}",
            MAX_SMOOTH_PARTS, part
        )));
    }
    Ok(())
}

/// Split the segment `from -> to` into `part` linear steps.
///
/// Yields `from + i * step` for `i` in `0..part`, where `step` is the
/// per-axis offset divided by `part` (truncating), followed by `to` itself,
/// so `part + 1` points in total.
///
/// # Errors
///
/// Returns `MinitouchError::InvalidArgument` if `part` is zero or above
/// [`MAX_SMOOTH_PARTS`].
pub fn interpolate(from: Point, to: Point, part: u32) -> Result<Vec<Point>> {
    check_part(part)?;

    let part = i64::from(part);
    let step_x = (i64::from(to.x) - i64::from(from.x)) / part;
    let step_y = (i64::from(to.y) - i64::from(from.y)) / part;

    let mut path: Vec<Point> = (0..part)
        .map(|i| {
            // Stays between the endpoints, so it fits back into i32
            Point::new(
                (i64::from(from.x) + i * step_x) as i32,
                (i64::from(from.y) + i * step_y) as i32,
            )
        })
        .collect();
    path.push(to);

    Ok(path)
}
