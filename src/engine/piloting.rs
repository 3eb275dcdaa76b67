//! # Piloting Command Loop
//!
//! Holds the four piloting axes and the countdown that brings them back to
//! neutral. The engine calls [`PilotingCommand::tick`] once per tick period
//! and writes the returned `pcmd` on the control channel.
//!
//! Countdown semantics, with `stop_delay` = S:
//! - a duration of `d` ms sets the countdown to `d / tick_ms + S`
//! - when the countdown reaches S the axes are forced to zero, so the drone
//!   decelerates for S ticks before the command terminates
//! - when it reaches 0 the command terminates (reported once)
//! - no duration disables the countdown (-1) until the command is cleared

use std::time::Duration;

use crate::arsdk::encoder::Command;

/// Range of a piloting axis, in percent
pub const AXIS_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

/// Four signed percentage axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PilotingAxes {
    pub roll: i8,
    pub pitch: i8,
    pub yaw: i8,
    pub gaz: i8,
}

impl PilotingAxes {
    /// All axes neutral
    pub const ZERO: PilotingAxes = PilotingAxes {
        roll: 0,
        pitch: 0,
        yaw: 0,
        gaz: 0,
    };

    /// Build axes from unbounded percentages, clamping each to [-100, 100]
    pub fn clamped(roll: i32, pitch: i32, yaw: i32, gaz: i32) -> Self {
        Self {
            roll: clamp_axis(roll),
            pitch: clamp_axis(pitch),
            yaw: clamp_axis(yaw),
            gaz: clamp_axis(gaz),
        }
    }

    /// True when one of the horizontal axes is in use
    pub fn is_horizontal(&self) -> bool {
        self.roll != 0 || self.pitch != 0
    }
}

fn clamp_axis(value: i32) -> i8 {
    // Range fits in i8 once clamped
    value.clamp(*AXIS_RANGE.start(), *AXIS_RANGE.end()) as i8
}

/// Countdown value meaning "no countdown"
const COUNTDOWN_DISABLED: i32 = -1;

/// Current piloting command and its countdown
#[derive(Debug, Clone)]
pub struct PilotingCommand {
    axes: PilotingAxes,
    countdown: i32,
    stop_delay: i32,
}

impl PilotingCommand {
    /// Neutral command with the given stop delay, in ticks
    pub fn new(stop_delay: u32) -> Self {
        Self {
            axes: PilotingAxes::ZERO,
            countdown: 0,
            stop_delay: stop_delay as i32,
        }
    }

    /// Back to neutral, no countdown
    pub fn reset(&mut self) {
        self.axes = PilotingAxes::ZERO;
        self.countdown = 0;
    }

    /// Set a new piloting command
    ///
    /// # Arguments
    ///
    /// * `axes` - Axis values to send on every tick
    /// * `duration` - How long to apply them, `None` for until cleared
    /// * `tick` - Tick period
    ///
    /// # Returns
    ///
    /// * `bool` - True if the command is terminated right away (no duration)
    pub fn set(&mut self, axes: PilotingAxes, duration: Option<Duration>, tick: Duration) -> bool {
        self.axes = axes;
        match duration {
            Some(duration) => {
                let tick_ms = tick.as_millis().max(1);
                let ticks = (duration.as_millis() / tick_ms).min(i32::MAX as u128 / 2) as i32;
                self.countdown = ticks + self.stop_delay;
                false
            }
            None => {
                self.countdown = COUNTDOWN_DISABLED;
                true
            }
        }
    }

    /// Zero the axes and restart the stop-delay countdown
    ///
    /// # Returns
    ///
    /// * `bool` - True if the command is terminated right away (zero stop delay)
    pub fn clear(&mut self) -> bool {
        self.axes = PilotingAxes::ZERO;
        self.countdown = self.stop_delay;
        self.countdown == 0
    }

    /// Advance by one tick
    ///
    /// # Returns
    ///
    /// * `(Command, bool)` - `pcmd` to send, and whether the command
    ///   terminated on this tick
    pub fn tick(&mut self) -> (Command, bool) {
        let mut terminated = false;

        if self.countdown > 0 {
            if self.countdown == self.stop_delay {
                self.axes = PilotingAxes::ZERO;
            }
            self.countdown -= 1;
            if self.countdown == 0 {
                self.axes = PilotingAxes::ZERO;
                terminated = true;
            }
        }

        (self.command(), terminated)
    }

    /// `pcmd` carrying the current axes
    pub fn command(&self) -> Command {
        Command::Pcmd {
            flag: self.axes.is_horizontal(),
            roll: self.axes.roll,
            pitch: self.axes.pitch,
            yaw: self.axes.yaw,
            gaz: self.axes.gaz,
        }
    }

    pub fn axes(&self) -> PilotingAxes {
        self.axes
    }

    pub fn countdown(&self) -> i32 {
        self.countdown
    }
}
