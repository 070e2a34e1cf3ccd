//! Pick color codec and the picking state machine.
//!
//! The picking pass writes each instance's global ID into an RGB pixel with
//! the low byte in red. Reading one pixel back and decoding it yields the ID
//! that [`IdMapping`](crate::IdMapping) resolves to a target.

use std::time::{Duration, Instant};

use crate::id_map::PickTarget;

/// Encodes a pick ID as `[r, g, b]` = `[byte0, byte1, byte2]`.
#[must_use]
pub fn encode_pick_id(id: u32) -> [u8; 3] {
    let [b0, b1, b2, _] = id.to_le_bytes();
    [b0, b1, b2]
}

/// Decodes a picked pixel back to the global ID.
#[must_use]
pub fn decode_pick_color(r: u8, g: u8, b: u8) -> u32 {
    u32::from_le_bytes([r, g, b, 0])
}

/// Why a pick is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickMode {
    /// Pointer motion; only changes in the hovered instance fire callbacks.
    Hover,
    /// Pointer click.
    Click,
}

/// Handle for one in-flight picking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickTicket {
    /// Generation at the time the pass started.
    pub generation: u64,
    /// Mode the pass was issued with.
    pub mode: PickMode,
}

/// Admission control for picking passes.
///
/// At most one pass runs at a time; requests arriving while one is in flight
/// are dropped. Anything that changes what a pixel means (rebuild, resize,
/// teardown) calls [`invalidate`](Self::invalidate), after which results of
/// older tickets are discarded. Hover state changes only supersede hover
/// passes, see [`invalidate_hover`](Self::invalidate_hover).
#[derive(Debug, Default)]
pub struct PickGate {
    in_flight: Option<PickMode>,
    generation: u64,
    passes_started: u64,
}

impl PickGate {
    /// Creates an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a pass if none is running.
    pub fn try_begin(&mut self, mode: PickMode) -> Option<PickTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(mode);
        self.generation += 1;
        self.passes_started += 1;
        Some(PickTicket {
            generation: self.generation,
            mode,
        })
    }

    /// Marks every outstanding ticket as superseded.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Supersedes the in-flight pass if it is a hover pass. Click passes
    /// still deliver their result.
    pub fn invalidate_hover(&mut self) {
        if self.in_flight == Some(PickMode::Hover) {
            self.invalidate();
        }
    }

    /// Ends the pass for `ticket`, returning whether its result may be applied.
    pub fn complete(&mut self, ticket: &PickTicket) -> bool {
        self.in_flight = None;
        ticket.generation == self.generation
    }

    /// Releases the lock without applying anything.
    pub fn abandon(&mut self) {
        self.in_flight = None;
    }

    /// Returns true while a pass is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Mode of the in-flight pass.
    #[must_use]
    pub fn in_flight_mode(&self) -> Option<PickMode> {
        self.in_flight
    }

    /// Number of passes ever started.
    #[must_use]
    pub fn passes_started(&self) -> u64 {
        self.passes_started
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A change in the hovered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverChange {
    /// The instance that stopped being hovered.
    pub left: Option<PickTarget>,
    /// The instance that became hovered.
    pub entered: Option<PickTarget>,
}

/// Remembers the hovered instance and reports changes.
#[derive(Debug, Default, Clone)]
pub struct HoverTracker {
    current: Option<PickTarget>,
}

impl HoverTracker {
    /// Records a hover resolution, returning the change if there was one.
    pub fn update(&mut self, target: Option<PickTarget>) -> Option<HoverChange> {
        if self.current == target {
            return None;
        }
        let left = std::mem::replace(&mut self.current, target);
        Some(HoverChange {
            left,
            entered: target,
        })
    }

    /// Currently hovered instance.
    #[must_use]
    pub fn current(&self) -> Option<PickTarget> {
        self.current
    }

    /// Forgets the hovered instance without reporting a change.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Rate limiter for hover picks.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    /// Creates a throttle that lets one event through per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and arms the throttle if an event may pass at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Lets the next event through regardless of timing.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
