//! Conversion entry points.
//!
//! [`Converter`] performs the `Init -> Opened` phase of a job (open the
//! input, pick the audio stream, open both codecs, create the output and
//! write its header) and then hands the stages to a [`Pipeline`].
//! [`convert_audio`] is the minimal status-code surface on top of it.
//!
//! # Example
//!
//! ```no_run
//! use audioconv::{ConvertOptions, Converter};
//!
//! let summary = Converter::new("input.wav", "output.m4a")
//!     .options(ConvertOptions::new().with_bit_rate(96_000))
//!     .run()?;
//! println!("wrote {} packets", summary.packets_written);
//! # Ok::<(), audioconv::ConvertError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::configuration::{ConvertOptions, ThreadCount};
use crate::decoder::AudioDecoder;
use crate::encoder::{AacEncoder, find_encoder};
use crate::error::ConvertError;
use crate::pipeline::{ConversionSummary, Pipeline};
use crate::reader::MediaSource;
use crate::resampler::Resampler;
use crate::writer::{MediaSink, OutputContainer};

/// A single conversion job from `input` to `output`.
#[derive(Debug, Clone)]
pub struct Converter {
    input: PathBuf,
    output: PathBuf,
    options: ConvertOptions,
}

impl Converter {
    pub fn new<I: AsRef<Path>, O: AsRef<Path>>(input: I, output: O) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            options: ConvertOptions::default(),
        }
    }

    /// Replace the job's options.
    #[must_use]
    pub fn options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run the job to completion on the calling thread.
    ///
    /// On success the output holds a complete file with its trailer. On
    /// failure every codec and file handle is released before this returns;
    /// if the output file had already been created it is then deleted,
    /// unless [`ConvertOptions::with_keep_partial_output`] was set. Failures
    /// before the output is created leave the output path untouched.
    ///
    /// # Errors
    ///
    /// Any [`ConvertError`]; see [`ConvertError::stage`] for where it
    /// happened.
    pub fn run(&self) -> Result<ConversionSummary, ConvertError> {
        ffmpeg_next::init()?;
        self.options.validate()?;
        let container = self.container()?;
        self.check_output_directory()?;

        let mut sink_created = false;
        let result = self.execute(container, &mut sink_created);

        if let Err(error) = &result {
            if sink_created && !self.options.keep_partial_output {
                match std::fs::remove_file(&self.output) {
                    Ok(()) => log::debug!(
                        "Removed partial output {} after: {error}",
                        self.output.display()
                    ),
                    Err(io) => log::warn!(
                        "Could not remove partial output {}: {io}",
                        self.output.display()
                    ),
                }
            }
        }
        result
    }

    fn container(&self) -> Result<OutputContainer, ConvertError> {
        match self.options.container {
            Some(container) => Ok(container),
            None => OutputContainer::from_path(&self.output).ok_or_else(|| {
                ConvertError::UnsupportedContainer {
                    path: self.output.clone(),
                }
            }),
        }
    }

    /// The output's parent directory must exist before any input is opened.
    fn check_output_directory(&self) -> Result<(), ConvertError> {
        let Some(parent) = self
            .output
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        else {
            return Ok(());
        };
        if std::fs::metadata(parent)?.is_dir() {
            Ok(())
        } else {
            Err(ConvertError::InvalidOption(format!(
                "{} is not a directory",
                parent.display()
            )))
        }
    }

    /// Acquire every stage and run the pipeline. All handles are dropped
    /// when this returns, in reverse order of acquisition.
    fn execute(
        &self,
        container: OutputContainer,
        sink_created: &mut bool,
    ) -> Result<ConversionSummary, ConvertError> {
        if self.options.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let mut source = MediaSource::open(&self.input)?;
        let stream = source.select_audio_stream()?;
        log::info!(
            "Converting {} ({}, stream {}: {} {} Hz, {} ch) -> {} ({container})",
            self.input.display(),
            source.format_name(),
            stream.index,
            stream.codec_name,
            stream.sample_rate,
            stream.channels,
            self.output.display()
        );

        let decoder = AudioDecoder::open(&source, &stream, self.options.threads)?;

        // Fail on a missing encoder before the output path is touched.
        find_encoder(self.options.codec)?;
        if same_file(&self.input, &self.output) {
            return Err(ConvertError::InvalidOption(format!(
                "output {} is the input file",
                self.output.display()
            )));
        }

        let mut sink = MediaSink::create(&self.output, container)?;
        *sink_created = true;

        let encoder = AacEncoder::open_for_source(
            decoder.output_spec(),
            &self.options,
            sink.requires_global_header(),
        )?;
        sink.declare_stream(&encoder)?;
        sink.write_header()?;

        let resampler = Resampler::configure(decoder.output_spec(), encoder.input_spec())?;

        Pipeline::new(source, decoder, resampler, encoder, sink)
            .with_options(&self.options)
            .run()
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Convert `input` to AAC in the container implied by `output`'s
/// extension, using the default encoding policy and `thread_count` codec
/// threads.
///
/// Returns `0` on success and `1` on any failure. Diagnostics go to
/// stderr. Use [`Converter`] to get the error value instead.
pub fn convert_audio<I: AsRef<Path>, O: AsRef<Path>>(input: I, output: O, thread_count: usize) -> i32 {
    let result = ThreadCount::new(thread_count).and_then(|threads| {
        Converter::new(input, output)
            .options(ConvertOptions::new().with_threads(threads))
            .run()
    });

    match result {
        Ok(_) => 0,
        Err(error) => {
            eprintln!("error: {error}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_comes_from_extension() {
        let converter = Converter::new("in.wav", "out.m4a");
        assert_eq!(converter.container().unwrap(), OutputContainer::Ipod);
        let converter = Converter::new("in.wav", "out.aac");
        assert_eq!(converter.container().unwrap(), OutputContainer::Adts);
    }

    #[test]
    fn explicit_container_overrides_extension() {
        let converter = Converter::new("in.wav", "out.bin")
            .options(ConvertOptions::new().with_container(OutputContainer::Matroska));
        assert_eq!(converter.container().unwrap(), OutputContainer::Matroska);
    }

    #[test]
    fn unknown_extension_is_rejected_before_opening() {
        let error = Converter::new("/missing/in.wav", "out.xyz").run().unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedContainer { .. }));
    }

    #[test]
    fn invalid_options_are_rejected_first() {
        let error = Converter::new("/missing/in.wav", "out.m4a")
            .options(ConvertOptions::new().with_bit_rate(0))
            .run()
            .unwrap_err();
        assert!(matches!(error, ConvertError::InvalidOption(_)));
    }

    #[test]
    fn missing_output_directory_is_an_io_error() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("absent").join("out.m4a");
        let error = Converter::new("/missing/in.wav", &output).run().unwrap_err();
        assert!(matches!(error, ConvertError::Io(_)));
        assert_eq!(error.stage(), crate::Stage::Driver);
        assert!(!output.exists());
    }

    #[test]
    fn zero_threads_fail_with_status_one() {
        assert_eq!(convert_audio("/missing/in.wav", "out.m4a", 0), 1);
    }
}
