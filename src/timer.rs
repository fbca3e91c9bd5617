//! MAC Timer API
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

/// Timer trait provides the monotonic time source for the MAC.
///
/// Both methods count from the same unknown epoch. The MAC schedules in
/// microseconds, so implementations must provide at least microsecond
/// resolution from `ticks_us`.
pub trait Timer {
    /// Returns the number of millisecond ticks since some unknown epoch
    fn ticks_ms(&self) -> u64 {
        self.ticks_us() / 1000
    }

    /// Returns the number of microsecond ticks since some unknown epoch
    fn ticks_us(&self) -> u64;
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    /// Shared mock clock, clones observe the same time
    #[derive(Clone, Debug, Default)]
    pub struct MockTimer (Arc<Mutex<u64>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_ms(&mut self, ms: u64) {
            *self.0.lock().unwrap() = ms * 1000;
        }

        pub fn set_us(&mut self, us: u64) {
            *self.0.lock().unwrap() = us;
        }

        pub fn advance_us(&mut self, us: u64) {
            *self.0.lock().unwrap() += us;
        }

        pub fn advance_ms(&mut self, ms: u64) {
            self.advance_us(ms * 1000)
        }
    }

    impl super::Timer for MockTimer {
        fn ticks_us(&self) -> u64 {
            *self.0.lock().unwrap()
        }
    }

}
