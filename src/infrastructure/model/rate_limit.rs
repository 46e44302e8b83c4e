//! Token-bucket rate limiting for the dispatch loop

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// A continuously refilling token bucket.
///
/// Permits accrue at a fixed rate while the bucket is idle, up to one
/// second's worth of stored burst. An acquisition larger than what is
/// stored is granted immediately but pushes the next grant out by the
/// deficit, so callers collectively block proportionally to what they
/// consume. The bucket starts cold: a fresh limiter has nothing stored.
pub struct TokenBucket {
    rate_per_sec: f64,
    max_stored: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    stored: f64,
    next_free: Instant,
}

impl TokenBucket {
    /// Limiter refilling `budget_per_minute` permits every minute
    pub fn per_minute(budget_per_minute: u32) -> Self {
        let rate_per_sec = f64::from(budget_per_minute) / 60.0;
        Self {
            rate_per_sec,
            // One second of burst, so short idle gaps smooth out without
            // letting a full minute's budget pile up.
            max_stored: rate_per_sec,
            state: Mutex::new(BucketState {
                stored: 0.0,
                next_free: Instant::now(),
            }),
        }
    }

    /// Acquire `permits`, sleeping until the bucket can cover them.
    ///
    /// The grant itself happens at the bucket's current front; the cost is
    /// paid forward by delaying every later acquisition.
    pub async fn acquire(&self, permits: u32) {
        let grant_at = {
            let mut state = self.state.lock().expect("rate limiter lock poisoned");
            let now = Instant::now();
            if now > state.next_free {
                let idle = now.duration_since(state.next_free).as_secs_f64();
                state.stored = (state.stored + idle * self.rate_per_sec).min(self.max_stored);
                state.next_free = now;
            }

            let from_stored = state.stored.min(f64::from(permits));
            state.stored -= from_stored;
            let deficit = f64::from(permits) - from_stored;

            let grant_at = state.next_free;
            state.next_free += Duration::from_secs_f64(deficit / self.rate_per_sec);
            grant_at
        };

        tokio::time::sleep_until(grant_at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_acquisition_is_granted_immediately() {
        let bucket = TokenBucket::per_minute(6000);
        let start = Instant::now();
        bucket.acquire(500).await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn acquisitions_block_proportionally_to_the_deficit() {
        // 6000 per minute = 100 per second.
        let bucket = TokenBucket::per_minute(6000);
        let start = Instant::now();
        bucket.acquire(500).await;
        bucket.acquire(500).await;
        // The second grant waits for the first grant's 5-second debt.
        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_secs(5), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn no_rolling_minute_exceeds_the_budget() {
        let budget = 6000;
        let cost = 500;
        let bucket = TokenBucket::per_minute(budget);

        let mut grants = Vec::new();
        let start = Instant::now();
        for _ in 0..24 {
            bucket.acquire(cost).await;
            grants.push(Instant::now().duration_since(start));
        }

        // Slide a 60-second window across every grant instant and total the
        // tokens granted inside it.
        for window_start in &grants {
            let window_end = *window_start + Duration::from_secs(60);
            let granted: u32 = grants
                .iter()
                .filter(|instant| **instant >= *window_start && **instant < window_end)
                .map(|_| cost)
                .sum();
            assert!(
                granted <= budget,
                "window starting at {:?} granted {} tokens",
                window_start,
                granted
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_storage_is_capped_at_one_second_of_budget() {
        // 600 per minute = 10 per second; stored burst caps at 10.
        let bucket = TokenBucket::per_minute(600);
        bucket.acquire(10).await;

        // A long idle stretch must not bank more than a second of budget.
        tokio::time::sleep(Duration::from_secs(600)).await;

        let start = Instant::now();
        bucket.acquire(10).await; // covered by stored burst
        bucket.acquire(10).await; // granted at the front, pays a second forward
        bucket.acquire(10).await; // must wait out that debt
        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    }
}
