//! Process-wide lifecycle bits.
//!
//! One `AtomicU32` shared by the main loop and every worker. Writers set and
//! clear bits with `fetch_or` / `fetch_and`; readers load without locking.

use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic lifecycle bitmask.
#[derive(Debug, Default)]
pub struct ControlBits(AtomicU32);

impl ControlBits {
    /// The process has finished stopping.
    pub const STOP: u32 = 1;
    /// A shutdown is in progress.
    pub const STOPPING: u32 = 1 << 1;
    /// A reload is in progress; workers may be restarted.
    pub const RELOADING: u32 = 1 << 2;

    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Set `bits`, returning the previous value.
    pub fn set(&self, bits: u32) -> u32 {
        self.0.fetch_or(bits, Ordering::AcqRel)
    }

    /// Clear `bits`, returning the previous value.
    pub fn unset(&self, bits: u32) -> u32 {
        self.0.fetch_and(!bits, Ordering::AcqRel)
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// True if any of `bits` is set.
    pub fn is_one_of(&self, bits: u32) -> bool {
        self.get() & bits != 0
    }

    pub fn is_not_one_of(&self, bits: u32) -> bool {
        !self.is_one_of(bits)
    }

    pub fn set_stopped(&self) {
        self.set(Self::STOP);
    }

    pub fn is_stopped(&self) -> bool {
        self.get() & Self::STOP == Self::STOP
    }

    /// True when a worker exiting now would be intentional.
    pub fn exit_expected(&self) -> bool {
        self.is_one_of(Self::STOP | Self::STOPPING | Self::RELOADING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_unset() {
        let control = ControlBits::new();
        assert!(!control.is_stopped());
        assert!(!control.exit_expected());

        assert_eq!(control.set(ControlBits::RELOADING), 0);
        assert!(control.is_one_of(ControlBits::RELOADING | ControlBits::STOPPING));
        assert!(control.exit_expected());

        control.set(ControlBits::STOPPING);
        assert_eq!(
            control.unset(ControlBits::RELOADING),
            ControlBits::RELOADING | ControlBits::STOPPING
        );
        assert!(control.is_not_one_of(ControlBits::RELOADING));
        assert!(control.is_one_of(ControlBits::STOPPING));

        control.set_stopped();
        assert!(control.is_stopped());
    }
}
