use crossbeam::utils::Backoff;
use std::thread;
use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` elapses.
///
/// Spins briefly, then yields, then falls back to short sleeps so long
/// waits do not burn a core. Returns the final value of `cond`.
pub fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let backoff = Backoff::new();
    let mut spins: u32 = 0;

    loop {
        if cond() {
            return true;
        }
        if start.elapsed() >= timeout {
            return cond();
        }

        spins = spins.saturating_add(1);
        if spins < 64 {
            backoff.spin();
        } else if spins < 256 {
            backoff.snooze();
        } else {
            thread::sleep(Duration::from_micros(200));
        }
    }
}
