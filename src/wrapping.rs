//! 32-bit wrapping sequence numbers and their conversion to/from the
//! 64-bit "absolute" sequence space used internally by the sender and
//! receiver.

use std::fmt;

/// A sequence number viewed modulo 2^32, as carried on the wire in the
/// TCP header. Arithmetic on this type always wraps; it is never treated
/// as a signed quantity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrappingInt32(u32);

impl WrappingInt32 {
    pub fn new(raw: u32) -> Self {
        WrappingInt32(raw)
    }

    pub fn raw_value(self) -> u32 {
        self.0
    }

    /// The sequence number one below this one, wrapping at zero.
    pub fn wrapping_pred(self) -> WrappingInt32 {
        WrappingInt32(self.0.wrapping_sub(1))
    }

    /// `wrap(n, isn) = (isn + n) mod 2^32`
    pub fn wrap(n: u64, isn: WrappingInt32) -> WrappingInt32 {
        WrappingInt32(isn.0.wrapping_add(n as u32))
    }

    /// Returns the 64-bit absolute sequence number that wraps to `self`
    /// under `isn` and is closest to `checkpoint` (ties broken toward
    /// the smaller value).
    pub fn unwrap(self, isn: WrappingInt32, checkpoint: u64) -> u64 {
        const MOD: u64 = 1u64 << 32;
        let offset = (self.0.wrapping_sub(isn.0)) as u64;
        let era = checkpoint >> 32;
        let candidate = era * MOD + offset;

        let mut best = candidate;
        let mut best_dist = absolute_diff(candidate, checkpoint);

        if candidate >= MOD {
            let lower = candidate - MOD;
            let dist = absolute_diff(lower, checkpoint);
            if dist < best_dist {
                best = lower;
                best_dist = dist;
            }
        }

        let upper = candidate + MOD;
        let dist = absolute_diff(upper, checkpoint);
        if dist < best_dist {
            best = upper;
        }

        best
    }
}

fn absolute_diff(a: u64, b: u64) -> u64 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

impl fmt::Display for WrappingInt32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WrappingInt32 {
    fn from(raw: u32) -> Self {
        WrappingInt32(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_basic() {
        let isn = WrappingInt32::new(0);
        assert_eq!(WrappingInt32::wrap((1u64 << 32) + 17, isn).raw_value(), 17);
    }

    #[test]
    fn unwrap_boundary() {
        let isn = WrappingInt32::new(0);
        let n = WrappingInt32::new(17);
        assert_eq!(n.unwrap(isn, 1u64 << 32), (1u64 << 32) + 17);
        assert_eq!(n.unwrap(isn, (1u64 << 31) - 1), 17);
    }

    #[test]
    fn unwrap_checkpoint_zero() {
        let isn = WrappingInt32::new(0x7432_1234);
        let n = WrappingInt32::new(0x7432_1235);
        assert_eq!(n.unwrap(isn, 0), 1);
    }

    #[test]
    fn unwrap_ties_prefer_smaller() {
        let isn = WrappingInt32::new(0);
        let n = WrappingInt32::new(0);
        // checkpoint exactly halfway between 0 and 2^32 should prefer 0.
        assert_eq!(n.unwrap(isn, 1u64 << 31), 0);
    }

    #[test]
    fn round_trip_within_half_range() {
        let isn = WrappingInt32::new(0xDEAD_BEEF);
        for &(n, checkpoint) in &[
            (0u64, 0u64),
            (1000, 500),
            (1u64 << 32, 1u64 << 32),
            ((1u64 << 33) + 10, (1u64 << 33)),
        ] {
            let wrapped = WrappingInt32::wrap(n, isn);
            assert_eq!(wrapped.unwrap(isn, checkpoint), n);
        }
    }
}
