//! Progress reporting and cancellation support.
//!
//! A conversion reports progress through a [`ProgressCallback`] as packets
//! are pulled from the input, and can be stopped between packets with a
//! [`CancellationToken`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use audioconv::{ConvertError, ConvertOptions, Converter, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% ({} packets)", info.packets_read);
//!         }
//!     }
//! }
//!
//! let options = ConvertOptions::new().with_progress(Arc::new(PrintProgress));
//! Converter::new("input.wav", "output.m4a").options(options).run()?;
//! # Ok::<(), ConvertError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of conversion progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`ConvertOptions::with_batch_size`](crate::ConvertOptions::with_batch_size) packets, and once
/// more when the output has been finalized.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Packets read from the input so far, including skipped ones.
    pub packets_read: u64,
    /// Media position of the most recently read packet.
    pub position: Option<Duration>,
    /// Input duration reported by the container, if known.
    pub duration: Option<Duration>,
    /// `position / duration` as a percentage (0.0 - 100.0), if both are known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since streaming started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on media throughput so far.
    pub estimated_remaining: Option<Duration>,
}

/// Trait for receiving progress updates during a conversion.
///
/// Implementations must be [`Send`] and [`Sync`] because a job may run on a
/// worker thread (see [`convert_batch`](crate::convert_batch) and
/// [`Converter::run_async`](crate::Converter)).
///
/// Callbacks observe but cannot halt the conversion. Use
/// [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while packets are streamed.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share the same flag. The driver checks
/// [`is_cancelled`](CancellationToken::is_cancelled) before reading each
/// packet and aborts with [`ConvertError::Cancelled`](crate::ConvertError::Cancelled).
///
/// ```
/// use audioconv::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks packet counts and media position and emits callbacks in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    duration: Option<Duration>,
    packets_read: u64,
    position: Option<Duration>,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        duration: Option<Duration>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            duration: duration.filter(|d| !d.is_zero()),
            packets_read: 0,
            position: None,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one packet read at `position` and report if the batch is full.
    pub(crate) fn advance(&mut self, position: Option<Duration>) {
        self.packets_read += 1;
        if position.is_some() {
            self.position = position;
        }
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report();
            self.since_last_report = 0;
        }
    }

    /// Emit a final report with the position pinned to the end of the input.
    pub(crate) fn finish(&mut self) {
        if self.duration.is_some() {
            self.position = self.duration;
        }
        self.report();
    }

    fn snapshot(&self) -> ProgressInfo {
        let elapsed = self.start_time.elapsed();

        let fraction = match (self.position, self.duration) {
            (Some(position), Some(duration)) => {
                Some((position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0))
            }
            _ => None,
        };

        let estimated_remaining = fraction
            .filter(|&f| f > 0.0)
            .map(|f| elapsed.mul_f64((1.0 - f) / f));

        ProgressInfo {
            packets_read: self.packets_read,
            position: self.position,
            duration: self.duration,
            percentage: fraction.map(|f| (f * 100.0) as f32),
            elapsed,
            estimated_remaining,
        }
    }

    fn report(&self) {
        self.callback.on_progress(&self.snapshot());
    }
}
