//! Progress reporting for long-running jobs.
//!
//! Computes percentages and remaining-time estimates and formats the
//! `[PROGRESS]` lines the orchestrator logs. Updates are emitted on 10%
//! steps, or once a minute after the first 30 seconds.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_DOWNLOAD_DURATION: Duration = Duration::from_secs(30);

/// Controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] configured with the tracker defaults.
    ///
    /// `range` is the job's `[start, end)` in Unix milliseconds and drives
    /// the estimate while the API has not reported a total.
    pub fn create_state(&self, total_expected: Option<u64>, range: Option<(i64, i64)>) -> ProgressState {
        let mut state = ProgressState::new(total_expected);
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state.range = range;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, 10.0)
    }
}

/// Progress of one job.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Calls processed so far (any outcome).
    pub calls_processed: u64,
    /// Total calls expected, once the API reports it.
    pub total_expected: Option<u64>,
    /// When the job started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between updates.
    pub update_interval: Duration,
    /// Calls per second.
    pub current_rate: f64,
    /// Current phase label, e.g. "page 3".
    pub current_phase: Option<String>,
    /// Last reported completion percentage.
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
    /// Job range in Unix milliseconds.
    pub range: Option<(i64, i64)>,
    /// Start time of the latest processed call, Unix milliseconds.
    pub last_position: Option<i64>,
}

impl ProgressState {
    /// Create a new state with default intervals.
    pub fn new(total_expected: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            calls_processed: 0,
            total_expected,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            current_phase: None,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
            range: None,
            last_position: None,
        }
    }

    /// Count newly processed calls.
    pub fn update(&mut self, new_calls: u64, latest_position: Option<i64>) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        self.calls_processed = self.calls_processed.saturating_add(new_calls);
        if elapsed > 0.0 {
            self.current_rate = self.calls_processed as f64 / elapsed;
        }
        if let Some(position) = latest_position {
            self.last_position = Some(position);
        }
    }

    /// Record the total once the first page reports it.
    pub fn set_total(&mut self, total: Option<u64>) {
        if total.is_some() {
            self.total_expected = total;
        }
    }

    /// Whether an update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.calls_processed == 0 {
            return false;
        }

        let percentage_jump = self
            .percentage()
            .map(|pct| pct - self.last_reported_percentage >= self.min_percentage_step)
            .unwrap_or(false);

        if percentage_jump {
            return true;
        }

        self.start_time.elapsed() >= MIN_DOWNLOAD_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        if let Some(pct) = self.percentage() {
            self.last_reported_percentage = pct;
        }
    }

    /// Set descriptive phase label.
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(|s| s.into());
    }

    /// Completion percentage (0-100) from counts, else from the timeline.
    pub fn percentage(&self) -> Option<f64> {
        if let Some(total) = self.total_expected {
            if total == 0 {
                return Some(100.0);
            }
            let pct = (self.calls_processed as f64 / total as f64) * 100.0;
            return Some(pct.min(100.0));
        }

        self.timeline_ratio().map(|ratio| ratio * 100.0)
    }

    /// Estimate remaining time based on counts or timeline.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate > 0.0 {
            if let Some(total) = self.total_expected {
                let remaining = total.saturating_sub(self.calls_processed);
                if remaining > 0 {
                    return Some(Duration::from_secs_f64(
                        remaining as f64 / self.current_rate,
                    ));
                }
            }
        }

        if let Some(ratio) = self.timeline_ratio() {
            if ratio > 0.0 && ratio < 1.0 {
                let elapsed = self.start_time.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    let total_secs = elapsed / ratio;
                    return Some(Duration::from_secs_f64((total_secs - elapsed).max(0.0)));
                }
            }
        }

        None
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!("[PROGRESS] Processed {} calls", self.calls_processed)];

        if let Some(pct) = self.percentage() {
            parts.push(format!("- {pct:.1}% complete"));
        }

        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.2} calls/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }

    fn timeline_ratio(&self) -> Option<f64> {
        let (start, end) = self.range?;
        let position = self.last_position?;
        let span = (end - start) as f64;
        if span <= 0.0 {
            return None;
        }
        let clamped = position.clamp(start, end);
        Some(((clamped - start) as f64 / span).clamp(0.0, 1.0))
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
