//! Admission spacing of the shared limiter under a paused clock

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use transcript_downloader::downloader::RateLimiter;

async fn admission_times(rate: f64, callers: usize) -> Vec<Instant> {
    let limiter = RateLimiter::per_second(rate).unwrap();
    let times = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<_> = (0..callers)
        .map(|_| {
            let limiter = limiter.clone();
            let times = times.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                times.lock().unwrap().push(Instant::now());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    let mut times = Arc::try_unwrap(times).unwrap().into_inner().unwrap();
    times.sort();
    times
}

fn max_in_window(times: &[Instant], window: Duration) -> usize {
    times
        .iter()
        .enumerate()
        .map(|(i, start)| times[i..].iter().take_while(|t| **t - *start < window).count())
        .max()
        .unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn test_no_window_exceeds_budget() {
    for (rate, budget) in [(1.0, 1), (2.5, 3), (3.0, 3), (10.0, 10)] {
        let times = admission_times(rate, 40).await;
        assert_eq!(times.len(), 40);
        let max = max_in_window(&times, Duration::from_secs(1));
        assert!(max <= budget, "rate {rate}: {max} admissions in one second");
        assert!(max >= budget.min(40) - 1, "rate {rate}: budget underused ({max})");
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_caller_is_not_delayed() {
    let limiter = RateLimiter::per_second(2.5).unwrap();
    let start = Instant::now();
    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::ZERO);
    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_budget() {
    let a = RateLimiter::per_second(2.0).unwrap();
    let b = a.clone();
    let start = Instant::now();
    a.acquire().await;
    b.acquire().await;
    a.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_idle_limiter_does_not_bank_credit() {
    let limiter = RateLimiter::per_second(1.0).unwrap();
    limiter.acquire().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    let start = Instant::now();
    limiter.acquire().await;
    limiter.acquire().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[test]
fn test_invalid_rates_are_rejected() {
    for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(RateLimiter::per_second(rate).is_err(), "rate {rate}");
    }
}
