use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Blunt per-IP fixed-window request counter. The process is the unit of
/// deployment here, so counters live in memory and reset on restart.
#[derive(Clone)]
pub struct RateLimiter {
    window_seconds: u64,
    max_requests: u32,
    counters: Arc<Mutex<HashMap<String, WindowCount>>>,
}

#[derive(Clone, Copy)]
struct WindowCount {
    window: u64,
    count: u32,
}

impl RateLimiter {
    pub fn new(window_seconds: u64, max_requests: u32) -> Self {
        Self {
            window_seconds,
            max_requests,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request from `ip`. Returns true when the caller has
    /// exhausted its budget for the current window.
    pub fn check_and_increment(&self, ip: &str) -> bool {
        let window = current_window(self.window_seconds);
        let mut counters = self.counters.lock().expect("rate limiter lock poisoned");

        // Stale entries never verify again, so sweep them before the map
        // can grow without bound.
        if counters.len() > 10_000 {
            counters.retain(|_, entry| entry.window == window);
        }

        let entry = counters.entry(ip.to_string()).or_insert(WindowCount {
            window,
            count: 0,
        });
        if entry.window != window {
            entry.window = window;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return true;
        }
        entry.count += 1;
        false
    }
}

fn current_window(window_seconds: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now / window_seconds
}
