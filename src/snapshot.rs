//! The snapshot value object and the panel layout constants.
//!
//! A [`Snapshot`] is constructed fresh by the producer each tick, transmitted
//! once, and consumed exactly once by the renderer's dispatch; it is never
//! mutated after construction. The layout constants below are the out-of-band
//! agreement between producer and consumer — the wire format carries no
//! dimensions.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of register slots on the panel.
pub const REGISTER_COUNT: usize = 9;
/// Bit cells per register.
pub const REGISTER_BITS: usize = 6;
/// Cells in the stack gauge.
pub const STACK_CELLS: usize = 7;
/// Command-history display slots.
pub const HISTORY_SLOTS: usize = 6;

pub const REGISTER_A: usize = 0;
pub const REGISTER_F: usize = 1;
pub const REGISTER_BH: usize = 2;
pub const REGISTER_BL: usize = 3;
pub const REGISTER_CH: usize = 4;
pub const REGISTER_CL: usize = 5;
pub const REGISTER_X: usize = 6;
pub const REGISTER_SP: usize = 7;
pub const REGISTER_PC: usize = 8;

/// Panel labels, in register order.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] =
    ["A", "F", "BH", "BL", "CH", "CL", "X", "SP", "PC"];

/// One register's lit-cell pattern.
pub type RegisterBits = [bool; REGISTER_BITS];

/// Clock reading carried by a snapshot.
///
/// Producers either relay a time-of-day pair or, in demo mode, a
/// monotonically increasing tick counter. On the wire this is the `numbers`
/// array — `[hours, minutes]` for a pair, `[ticks]` for a counter; the
/// length tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Pair { hours: u8, minutes: u8 },
    Ticks(u64),
}

impl Clock {
    /// The two zero-padded two-digit strings the clock fields display.
    ///
    /// A tick counter is shown as elapsed minutes and seconds, so 65 ticks
    /// reads `("01", "05")`.
    pub fn display(&self) -> (String, String) {
        match *self {
            Clock::Pair { hours, minutes } => (format!("{hours:02}"), format!("{minutes:02}")),
            Clock::Ticks(ticks) => (
                format!("{:02}", (ticks / 60) % 100),
                format!("{:02}", ticks % 60),
            ),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::Pair {
            hours: 0,
            minutes: 0,
        }
    }
}

impl Serialize for Clock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Clock::Pair { hours, minutes } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&u64::from(hours))?;
                seq.serialize_element(&u64::from(minutes))?;
                seq.end()
            }
            Clock::Ticks(ticks) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&ticks)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Clock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClockVisitor;

        impl<'de> Visitor<'de> for ClockVisitor {
            type Value = Clock;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of one tick count or two clock numbers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Clock, A::Error> {
                let first: u64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let Some(second) = seq.next_element::<u64>()? else {
                    return Ok(Clock::Ticks(first));
                };
                if seq.next_element::<u64>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                let hours = u8::try_from(first)
                    .map_err(|_| de::Error::custom("clock hours out of range"))?;
                let minutes = u8::try_from(second)
                    .map_err(|_| de::Error::custom("clock minutes out of range"))?;
                Ok(Clock::Pair { hours, minutes })
            }
        }

        deserializer.deserialize_seq(ClockVisitor)
    }
}

/// One immutable point-in-time capture of backend state destined for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Clock reading; serialized as the `numbers` array.
    #[serde(rename = "numbers")]
    pub clock: Clock,
    /// Lit-cell pattern per register, in register order.
    pub registers: [RegisterBits; REGISTER_COUNT],
    /// Stack gauge fullness, counted from the bottom; at most [`STACK_CELLS`].
    pub stack: u8,
    /// Recent command strings, newest first; entries beyond
    /// [`HISTORY_SLOTS`] are dropped at dispatch.
    pub history: Vec<String>,
}
