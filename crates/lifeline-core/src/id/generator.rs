//! Identifier generation
//!
//! [`IdGenerator`] is the default: every call reads the clock and draws two
//! fresh random values from the calling thread's own RNG, so concurrent
//! callers never contend on shared state. Uniqueness is probabilistic (74
//! random bits per millisecond); storage enforces it with a uniqueness
//! constraint on the identifier.
//!
//! [`MonotonicGenerator`] trades that independence for strict ordering
//! within one owner: it is `&mut self` and must never be shared.

use rand::Rng;

use super::{IdFields, RequestId, ENTROPY_HIGH_MAX, ENTROPY_LOW_MAX, TIMESTAMP_MAX};
use crate::clock::{Clock, SystemClock};

/// Combined width of `entropy_high` and `entropy_low`.
const ENTROPY_BITS: u32 = 74;
const ENTROPY_MAX: u128 = (1 << ENTROPY_BITS) - 1;

/// How far the clock may step back before a monotonic generator gives up
/// on ordering and reseeds.
const MAX_ROLLBACK_MS: u64 = 10_000;

/// Mint an identifier from the system clock.
pub fn new_request_id() -> RequestId {
    IdGenerator::new().next_id()
}

/// Lock-free identifier generator.
///
/// Cheap to clone and safe to share; it holds nothing but the clock.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator<C: Clock = SystemClock> {
    clock: C,
}

impl IdGenerator<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> IdGenerator<C> {
    /// Create a generator reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Mint the next identifier.
    ///
    /// A clock that stepped back yields a smaller timestamp than a previous
    /// call; this is accepted rather than blocking.
    pub fn next_id(&self) -> RequestId {
        let timestamp = self.clock.now_millis();
        let mut rng = rand::thread_rng();
        let entropy_high: u16 = rng.gen::<u16>() & ENTROPY_HIGH_MAX;
        let entropy_low: u64 = rng.gen::<u64>() & ENTROPY_LOW_MAX;
        RequestId::encode(IdFields::masked(timestamp, entropy_high, entropy_low))
    }
}

/// Generator whose output strictly increases for as long as it is owned by
/// one worker.
///
/// Within one millisecond the 74 entropy bits act as a counter seeded at a
/// random value with the top bit clear. On counter exhaustion the timestamp
/// is advanced by one millisecond. If the clock steps back by more than ten
/// seconds the generator reseeds and ordering restarts from the new time.
#[derive(Debug)]
pub struct MonotonicGenerator<C: Clock = SystemClock> {
    clock: C,
    last: Option<(u64, u128)>,
}

impl MonotonicGenerator<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MonotonicGenerator<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MonotonicGenerator<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock, last: None }
    }

    /// Mint an identifier greater than every identifier this instance has
    /// produced so far, barring a large clock rollback.
    pub fn next_id(&mut self) -> RequestId {
        let now = self.clock.now_millis() & TIMESTAMP_MAX;

        let (timestamp, counter) = match self.last {
            Some((last_ts, last_counter))
                if now <= last_ts && last_ts - now <= MAX_ROLLBACK_MS =>
            {
                if last_counter < ENTROPY_MAX {
                    (last_ts, last_counter + 1)
                } else {
                    ((last_ts + 1).min(TIMESTAMP_MAX), seed())
                }
            }
            _ => (now, seed()),
        };

        self.last = Some((timestamp, counter));
        RequestId::encode(IdFields::masked(
            timestamp,
            (counter >> 62) as u16,
            counter as u64,
        ))
    }
}

/// Random counter start leaving half the range as headroom.
fn seed() -> u128 {
    let mut rng = rand::thread_rng();
    rng.gen::<u128>() & (ENTROPY_MAX >> 1)
}
