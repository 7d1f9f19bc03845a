//! Parallel batch conversion.
//!
//! Every job builds its own [`Converter`], and with it its own source,
//! codecs and sink, so jobs share nothing but the options they were given.

use std::path::PathBuf;

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::configuration::ConvertOptions;
use crate::convert::Converter;
use crate::error::ConvertError;
use crate::pipeline::ConversionSummary;

/// Run independent `(input, output)` jobs on the rayon thread pool.
///
/// One job failing does not stop the others. Results are returned in the
/// order of `jobs`. A shared [`CancellationToken`](crate::CancellationToken)
/// in `options` cancels every job still running.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
///
/// use audioconv::{ConvertOptions, convert_batch};
///
/// let jobs = vec![
///     (PathBuf::from("a.wav"), PathBuf::from("a.m4a")),
///     (PathBuf::from("b.flac"), PathBuf::from("b.m4a")),
/// ];
/// for result in convert_batch(&jobs, &ConvertOptions::new()) {
///     if let Err(error) = result {
///         eprintln!("{error}");
///     }
/// }
/// ```
pub fn convert_batch(
    jobs: &[(PathBuf, PathBuf)],
    options: &ConvertOptions,
) -> Vec<Result<ConversionSummary, ConvertError>> {
    log::debug!("Starting batch of {} conversion(s)", jobs.len());
    jobs.par_iter()
        .map(|(input, output)| {
            Converter::new(input, output)
                .options(options.clone())
                .run()
        })
        .collect()
}
