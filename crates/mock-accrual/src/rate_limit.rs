//! 固定窗口限流
//!
//! 每 60 秒窗口内最多 N 次请求，超出时返回窗口剩余秒数。

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    /// 0 表示不限
    limit: u32,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// 允许则返回 Ok，否则返回建议的 Retry-After
    pub fn check(&self) -> Result<(), Duration> {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> Result<(), Duration> {
        if self.limit == 0 {
            return Ok(());
        }

        let mut window = self.window.lock();
        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= WINDOW {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let remaining = WINDOW.saturating_sub(now.saturating_duration_since(window.started));
            // 向上取整到秒
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(Duration::from_secs(secs.max(1)));
        }

        window.count += 1;
        Ok(())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
