//! Async conversion via Tokio.
//!
//! A conversion is blocking, CPU-bound work, so it runs on
//! `tokio::task::spawn_blocking`; [`ConversionFuture`] resolves with its
//! result.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::convert::Converter;
use crate::error::ConvertError;
use crate::pipeline::ConversionSummary;

/// The pending result of a conversion running on a blocking thread.
///
/// Dropping the future does not stop the job; use a
/// [`CancellationToken`](crate::CancellationToken) for that.
///
/// # Example
///
/// ```no_run
/// use audioconv::{ConvertError, Converter};
///
/// # async fn example() -> Result<(), ConvertError> {
/// let summary = Converter::new("input.flac", "output.m4a").run_async().await?;
/// println!("{:.1}s encoded", summary.duration().as_secs_f64());
/// # Ok(())
/// # }
/// ```
pub struct ConversionFuture {
    handle: JoinHandle<Result<ConversionSummary, ConvertError>>,
}

impl Future for ConversionFuture {
    type Output = Result<ConversionSummary, ConvertError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(ConvertError::Cancelled)))
    }
}

impl Converter {
    /// Run the job on Tokio's blocking pool. Must be called within a Tokio
    /// runtime.
    pub fn run_async(self) -> ConversionFuture {
        let handle = tokio::task::spawn_blocking(move || self.run());
        ConversionFuture { handle }
    }
}
