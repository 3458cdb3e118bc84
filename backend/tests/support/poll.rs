//! Polling helpers for work that completes on another thread.

use std::thread;
use std::time::{Duration, Instant};

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns whether it held.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
