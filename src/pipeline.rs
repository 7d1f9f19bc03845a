//! The conversion driver.
//!
//! [`Pipeline`] owns one instance of every stage and runs the streaming loop:
//! pull a packet from the source, push it through decode, resample, encode
//! and write, and at end of input flush each stage in order before writing
//! the trailer.
//!
//! The stages are abstracted behind small traits ([`PacketSource`],
//! [`FrameDecoder`], [`FrameResampler`], [`FrameEncoder`], [`PacketWriter`])
//! implemented by the FFmpeg-backed types of this crate. The driver only
//! relies on their contracts, which keeps its error and flush handling
//! testable without media files.
//!
//! # States
//!
//! ```text
//! Init -> Opened -> Streaming -> Flushing -> Finalized
//!            \           \           \
//!             +-----------+-----------+--> Aborted
//! ```
//!
//! `Init -> Opened` is performed by [`Converter`](crate::Converter), which
//! acquires the stages and hands them to [`Pipeline::new`].

use std::sync::Arc;
use std::time::Duration;

use crate::configuration::{ConvertOptions, DEFAULT_MAX_DECODE_ERRORS};
use crate::decoder::AudioDecoder;
use crate::encoder::AacEncoder;
use crate::error::ConvertError;
use crate::frame::RawFrame;
use crate::packet::EncodedPacket;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker};
use crate::reader::MediaSource;
use crate::resampler::Resampler;
use crate::writer::MediaSink;

/// Lifecycle of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing acquired yet.
    Init,
    /// All stages open and the output header written.
    Opened,
    /// Packets are being pulled and pushed through the stages.
    Streaming,
    /// End of input reached; stages are being drained.
    Flushing,
    /// Trailer written. The only successful terminal state.
    Finalized,
    /// A fatal error occurred.
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Finalized | PipelineState::Aborted)
    }
}

/// Produces packets in container order.
pub trait PacketSource {
    /// The next packet, or `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>, ConvertError>;

    /// Total media duration, if known. Used for progress reporting.
    fn duration(&self) -> Option<Duration> {
        None
    }
}

/// Turns packets into frames.
pub trait FrameDecoder {
    /// Decode one packet. A [`ConvertError::Decode`] is recoverable.
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<RawFrame>, ConvertError>;

    /// Drain buffered frames. Called once, after the last packet.
    fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError>;
}

/// Converts frames to the encoder's input format.
pub trait FrameResampler {
    fn convert(&mut self, frame: RawFrame) -> Result<Vec<RawFrame>, ConvertError>;

    /// Drain the delay line. Called once, after the decoder's flush output.
    fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError>;
}

/// Turns frames into packets.
pub trait FrameEncoder {
    fn encode(&mut self, frame: RawFrame) -> Result<Vec<EncodedPacket>, ConvertError>;

    /// Drain buffered packets. Called once, after the resampler's flush
    /// output.
    fn flush(&mut self) -> Result<Vec<EncodedPacket>, ConvertError>;

    /// Output sample rate.
    fn sample_rate(&self) -> u32;

    /// Priming samples the codec prepends.
    fn initial_padding(&self) -> i64 {
        0
    }
}

/// Muxes packets into the output.
pub trait PacketWriter {
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), ConvertError>;

    /// Finalize the output. Called once, as the last step of a successful run.
    fn write_trailer(&mut self) -> Result<(), ConvertError>;
}

impl PacketSource for MediaSource {
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>, ConvertError> {
        MediaSource::read_packet(self)
    }

    fn duration(&self) -> Option<Duration> {
        MediaSource::duration(self)
    }
}

impl FrameDecoder for AudioDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<RawFrame>, ConvertError> {
        AudioDecoder::decode(self, packet)
    }

    fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
        AudioDecoder::flush(self)
    }
}

impl FrameResampler for Resampler {
    fn convert(&mut self, frame: RawFrame) -> Result<Vec<RawFrame>, ConvertError> {
        Resampler::convert(self, frame)
    }

    fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
        Resampler::flush(self)
    }
}

impl FrameEncoder for AacEncoder {
    fn encode(&mut self, frame: RawFrame) -> Result<Vec<EncodedPacket>, ConvertError> {
        AacEncoder::encode(self, frame)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>, ConvertError> {
        AacEncoder::flush(self)
    }

    fn sample_rate(&self) -> u32 {
        self.input_spec().rate
    }

    fn initial_padding(&self) -> i64 {
        AacEncoder::initial_padding(self)
    }
}

impl PacketWriter for MediaSink {
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), ConvertError> {
        MediaSink::write_packet(self, packet)
    }

    fn write_trailer(&mut self) -> Result<(), ConvertError> {
        MediaSink::write_trailer(self)
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Packets read from the input, for all streams.
    pub packets_read: u64,
    /// Packets of other streams that were discarded.
    pub packets_skipped: u64,
    /// Packets of the selected stream that decoded.
    pub packets_decoded: u64,
    /// Packets of the selected stream that failed to decode and were skipped.
    pub decode_errors: u64,
    pub frames_decoded: u64,
    pub frames_resampled: u64,
    /// Samples per channel handed to the encoder.
    pub samples_encoded: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    /// Output sample rate.
    pub sample_rate: u32,
    /// Encoder priming samples (`initial_padding`).
    pub encoder_delay: i64,
}

impl ConversionSummary {
    /// Duration of the encoded audio, excluding encoder priming.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_encoded as f64 / f64::from(self.sample_rate))
    }
}

/// One conversion job: a source, the three codec stages, and a sink.
pub struct Pipeline<S, D, R, E, W> {
    // Fields drop in declaration order, which is the reverse of acquisition.
    resampler: R,
    encoder: E,
    writer: W,
    decoder: D,
    source: S,
    state: PipelineState,
    max_decode_errors: usize,
    progress: Arc<dyn ProgressCallback>,
    cancellation: Option<CancellationToken>,
    batch_size: u64,
    summary: ConversionSummary,
}

impl<S, D, R, E, W> Pipeline<S, D, R, E, W>
where
    S: PacketSource,
    D: FrameDecoder,
    R: FrameResampler,
    E: FrameEncoder,
    W: PacketWriter,
{
    /// Assemble a pipeline from opened stages. The writer's header must
    /// already be written; the pipeline starts in [`PipelineState::Opened`].
    pub fn new(source: S, decoder: D, resampler: R, encoder: E, writer: W) -> Self {
        Self {
            resampler,
            encoder,
            writer,
            decoder,
            source,
            state: PipelineState::Opened,
            max_decode_errors: DEFAULT_MAX_DECODE_ERRORS,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            summary: ConversionSummary::default(),
        }
    }

    /// Take the decode-error limit, progress callback and cancellation token
    /// from `options`.
    #[must_use]
    pub fn with_options(mut self, options: &ConvertOptions) -> Self {
        self.max_decode_errors = options.max_decode_errors.max(1);
        self.progress = Arc::clone(&options.progress);
        self.cancellation = options.cancellation.clone();
        self.batch_size = options.batch_size;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Counters so far. Complete once the run has ended.
    pub fn summary(&self) -> &ConversionSummary {
        &self.summary
    }

    /// Run the job to completion.
    ///
    /// Returns the summary on reaching [`PipelineState::Finalized`]. On any
    /// fatal error the pipeline moves to [`PipelineState::Aborted`] and the
    /// error is returned; the trailer is not written.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::InvalidState`] unless the pipeline is `Opened`.
    /// - [`ConvertError::DecodeErrorLimit`] once the consecutive decode-error
    ///   limit is reached, or when no packet could be decoded at all.
    /// - [`ConvertError::Cancelled`] if the cancellation token fires.
    /// - Any fatal error of a stage.
    pub fn run(&mut self) -> Result<ConversionSummary, ConvertError> {
        if self.state != PipelineState::Opened {
            return Err(ConvertError::InvalidState(self.state));
        }
        self.summary.sample_rate = self.encoder.sample_rate();
        self.summary.encoder_delay = self.encoder.initial_padding();

        let mut tracker =
            ProgressTracker::new(Arc::clone(&self.progress), self.source.duration(), self.batch_size);

        match self.stream(&mut tracker).and_then(|()| self.finish(&mut tracker)) {
            Ok(()) => {
                self.transition(PipelineState::Finalized);
                log::info!(
                    "Conversion finished: {} packets written, {:.2}s of audio, {} decode error(s) skipped",
                    self.summary.packets_written,
                    self.summary.duration().as_secs_f64(),
                    self.summary.decode_errors
                );
                Ok(self.summary.clone())
            }
            Err(error) => {
                log::error!("Conversion aborted in {:?} state: {error}", self.state);
                self.transition(PipelineState::Aborted);
                Err(error)
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            !self.state.is_terminal(),
            "transition out of terminal state {:?}",
            self.state
        );
        log::debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    fn stream(&mut self, tracker: &mut ProgressTracker) -> Result<(), ConvertError> {
        self.transition(PipelineState::Streaming);

        let mut consecutive_errors = 0;
        let mut last_error = String::new();

        loop {
            if self.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }
            let Some(packet) = self.source.read_packet()? else {
                break;
            };
            self.summary.packets_read += 1;
            tracker.advance(media_position(&packet));

            if packet.is_skip() {
                self.summary.packets_skipped += 1;
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(frames) => {
                    consecutive_errors = 0;
                    self.summary.packets_decoded += 1;
                    for frame in frames {
                        self.push_decoded(frame)?;
                    }
                }
                Err(error) if error.is_recoverable() => {
                    consecutive_errors += 1;
                    self.summary.decode_errors += 1;
                    log::warn!(
                        "Skipping undecodable packet (pts {:?}), {consecutive_errors} in a row: {error}",
                        packet.pts()
                    );
                    if consecutive_errors >= self.max_decode_errors {
                        return Err(ConvertError::DecodeErrorLimit {
                            consecutive: consecutive_errors,
                            reason: error.to_string(),
                        });
                    }
                    last_error = error.to_string();
                }
                Err(error) => return Err(error),
            }
        }

        if self.summary.decode_errors > 0 && self.summary.packets_decoded == 0 {
            return Err(ConvertError::DecodeErrorLimit {
                consecutive: consecutive_errors,
                reason: format!("no packet of the input could be decoded ({last_error})"),
            });
        }
        Ok(())
    }

    fn finish(&mut self, tracker: &mut ProgressTracker) -> Result<(), ConvertError> {
        self.transition(PipelineState::Flushing);

        for frame in self.decoder.flush()? {
            self.push_decoded(frame)?;
        }
        for frame in self.resampler.flush()? {
            self.push_resampled(frame)?;
        }
        for packet in self.encoder.flush()? {
            self.push_encoded(packet)?;
        }
        self.writer.write_trailer()?;

        tracker.finish();
        Ok(())
    }

    fn push_decoded(&mut self, frame: RawFrame) -> Result<(), ConvertError> {
        self.summary.frames_decoded += 1;
        for converted in self.resampler.convert(frame)? {
            self.push_resampled(converted)?;
        }
        Ok(())
    }

    fn push_resampled(&mut self, frame: RawFrame) -> Result<(), ConvertError> {
        self.summary.frames_resampled += 1;
        self.summary.samples_encoded += frame.samples() as u64;
        for packet in self.encoder.encode(frame)? {
            self.push_encoded(packet)?;
        }
        Ok(())
    }

    fn push_encoded(&mut self, packet: EncodedPacket) -> Result<(), ConvertError> {
        let size = packet.size() as u64;
        self.writer.write_packet(packet)?;
        self.summary.packets_written += 1;
        self.summary.bytes_written += size;
        Ok(())
    }
}

impl<S, D, R, E, W> std::fmt::Debug for Pipeline<S, D, R, E, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("max_decode_errors", &self.max_decode_errors)
            .field("summary", &self.summary)
            .finish()
    }
}

fn media_position(packet: &EncodedPacket) -> Option<Duration> {
    let pts = packet.pts().or(packet.dts())?;
    let time_base = packet.time_base();
    if pts < 0 || time_base.denominator() == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(pts as f64 * f64::from(time_base)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use ffmpeg_next::{ChannelLayout, Rational, format::Sample, format::sample::Type};

    use super::*;
    use crate::error::Stage;
    use crate::frame::SampleSpec;

    const FRAME: usize = 1024;
    const CORRUPT: u8 = 0xFF;

    #[derive(Default)]
    struct Calls {
        decoder_flushes: usize,
        resampler_flushes: usize,
        encoder_flushes: usize,
        trailers: usize,
        written: Vec<usize>,
    }

    type Log = Rc<RefCell<Calls>>;

    fn spec() -> SampleSpec {
        SampleSpec::new(Sample::F32(Type::Planar), 48_000, ChannelLayout::STEREO, 2)
    }

    struct Source(VecDeque<EncodedPacket>);

    impl Source {
        /// `layout` bytes: 0 = good audio packet, CORRUPT = corrupt audio
        /// packet, 1 = packet of another stream.
        fn new(layout: &[u8]) -> Self {
            let packets = layout
                .iter()
                .enumerate()
                .map(|(n, &kind)| {
                    let pts = Some((n * FRAME) as i64);
                    let packet = EncodedPacket::from_bytes(&[kind; 16], 0, Rational(1, 48_000), pts);
                    if kind == 1 { packet.skipped() } else { packet }
                })
                .collect();
            Source(packets)
        }
    }

    impl PacketSource for Source {
        fn read_packet(&mut self) -> Result<Option<EncodedPacket>, ConvertError> {
            Ok(self.0.pop_front())
        }
    }

    struct Decoder(Log);

    impl FrameDecoder for Decoder {
        fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<RawFrame>, ConvertError> {
            if packet.data()[0] == CORRUPT {
                return Err(ConvertError::Decode {
                    stream_index: 0,
                    reason: "Invalid data found when processing input".to_string(),
                });
            }
            Ok(vec![RawFrame::silence(spec(), FRAME)])
        }

        fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
            self.0.borrow_mut().decoder_flushes += 1;
            Ok(Vec::new())
        }
    }

    struct Passthrough(Log);

    impl FrameResampler for Passthrough {
        fn convert(&mut self, frame: RawFrame) -> Result<Vec<RawFrame>, ConvertError> {
            Ok(vec![frame])
        }

        fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
            self.0.borrow_mut().resampler_flushes += 1;
            Ok(Vec::new())
        }
    }

    /// One packet per frame; holds the last frame back until flush, like a
    /// codec with one frame of lookahead.
    struct Encoder {
        log: Log,
        held: Option<usize>,
        fail_on: Option<usize>,
        seen: usize,
    }

    impl Encoder {
        fn new(log: &Log) -> Self {
            Self {
                log: Rc::clone(log),
                held: None,
                fail_on: None,
                seen: 0,
            }
        }

        fn packet(samples: usize) -> EncodedPacket {
            EncodedPacket::from_bytes(&vec![0; samples / 8], 0, Rational(1, 48_000), None)
        }
    }

    impl FrameEncoder for Encoder {
        fn encode(&mut self, frame: RawFrame) -> Result<Vec<EncodedPacket>, ConvertError> {
            self.seen += 1;
            if self.fail_on == Some(self.seen) {
                return Err(ConvertError::Encode("Invalid argument".to_string()));
            }
            Ok(self.held.replace(frame.samples()).map(Self::packet).into_iter().collect())
        }

        fn flush(&mut self) -> Result<Vec<EncodedPacket>, ConvertError> {
            self.log.borrow_mut().encoder_flushes += 1;
            Ok(self.held.take().map(Self::packet).into_iter().collect())
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }

        fn initial_padding(&self) -> i64 {
            1024
        }
    }

    struct Writer(Log);

    impl PacketWriter for Writer {
        fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), ConvertError> {
            self.0.borrow_mut().written.push(packet.size());
            Ok(())
        }

        fn write_trailer(&mut self) -> Result<(), ConvertError> {
            self.0.borrow_mut().trailers += 1;
            Ok(())
        }
    }

    fn pipeline(layout: &[u8], log: &Log) -> Pipeline<Source, Decoder, Passthrough, Encoder, Writer> {
        Pipeline::new(
            Source::new(layout),
            Decoder(Rc::clone(log)),
            Passthrough(Rc::clone(log)),
            Encoder::new(log),
            Writer(Rc::clone(log)),
        )
    }

    #[test]
    fn clean_run_finalizes_and_flushes_once() {
        let log = Log::default();
        let mut pipeline = pipeline(&[0; 10], &log);
        assert_eq!(pipeline.state(), PipelineState::Opened);

        let summary = pipeline.run().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Finalized);
        assert!(pipeline.state().is_terminal());
        assert_eq!(summary.packets_read, 10);
        assert_eq!(summary.frames_decoded, 10);
        assert_eq!(summary.samples_encoded, 10 * FRAME as u64);
        assert_eq!(summary.packets_written, 10);
        assert_eq!(summary.encoder_delay, 1024);

        let calls = log.borrow();
        assert_eq!(calls.decoder_flushes, 1);
        assert_eq!(calls.resampler_flushes, 1);
        assert_eq!(calls.encoder_flushes, 1);
        assert_eq!(calls.trailers, 1);
        // The held-back frame only comes out of the encoder's flush.
        assert_eq!(calls.written.len(), 10);
    }

    #[test]
    fn second_run_is_rejected() {
        let log = Log::default();
        let mut pipeline = pipeline(&[0; 3], &log);
        pipeline.run().unwrap();
        assert!(matches!(
            pipeline.run(),
            Err(ConvertError::InvalidState(PipelineState::Finalized))
        ));
        assert_eq!(log.borrow().trailers, 1);
        assert_eq!(log.borrow().decoder_flushes, 1);
    }

    #[test]
    fn three_consecutive_corrupt_packets_abort() {
        let log = Log::default();
        let mut layout = vec![0; 4];
        layout.extend([CORRUPT; 3]);
        layout.extend([0; 10]);
        let mut pipeline = pipeline(&layout, &log);

        let error = pipeline.run().unwrap_err();
        assert!(matches!(error, ConvertError::DecodeErrorLimit { consecutive: 3, .. }));
        assert_eq!(error.stage(), Stage::Decoder);
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert_eq!(pipeline.summary().packets_read, 7);
        assert_eq!(log.borrow().trailers, 0);
        assert_eq!(log.borrow().decoder_flushes, 0);
    }

    #[test]
    fn single_corrupt_packet_is_skipped() {
        let log = Log::default();
        let mut layout = vec![0; 20];
        layout[7] = CORRUPT;

        let summary = pipeline(&layout, &log).run().unwrap();
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(summary.packets_decoded, 19);
        // One frame shorter than the clean input.
        assert_eq!(summary.samples_encoded, 19 * FRAME as u64);
        assert_eq!(log.borrow().trailers, 1);
    }

    #[test]
    fn non_consecutive_errors_reset_the_counter() {
        let log = Log::default();
        let layout = [0, CORRUPT, CORRUPT, 0, CORRUPT, CORRUPT, 0];
        let summary = pipeline(&layout, &log).run().unwrap();
        assert_eq!(summary.decode_errors, 4);
        assert_eq!(summary.packets_decoded, 3);
    }

    #[test]
    fn input_that_never_decodes_aborts() {
        let log = Log::default();
        let mut pipeline = pipeline(&[CORRUPT, CORRUPT], &log).with_options(&ConvertOptions::new());
        let error = pipeline.run().unwrap_err();
        assert!(matches!(error, ConvertError::DecodeErrorLimit { .. }));
        assert_eq!(log.borrow().trailers, 0);
    }

    #[test]
    fn skip_tagged_packets_are_discarded() {
        let log = Log::default();
        let summary = pipeline(&[1, 0, 1, 1, 0, 0, 1], &log).run().unwrap();
        assert_eq!(summary.packets_read, 7);
        assert_eq!(summary.packets_skipped, 4);
        assert_eq!(summary.frames_decoded, 3);
    }

    #[test]
    fn encoder_failure_is_fatal() {
        let log = Log::default();
        let mut encoder = Encoder::new(&log);
        encoder.fail_on = Some(2);
        let mut pipeline = Pipeline::new(
            Source::new(&[0; 5]),
            Decoder(Rc::clone(&log)),
            Passthrough(Rc::clone(&log)),
            encoder,
            Writer(Rc::clone(&log)),
        );

        let error = pipeline.run().unwrap_err();
        assert!(matches!(error, ConvertError::Encode(_)));
        assert!(!error.is_recoverable());
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert_eq!(log.borrow().trailers, 0);
    }

    #[test]
    fn cancellation_stops_before_reading() {
        let log = Log::default();
        let token = CancellationToken::new();
        token.cancel();
        let options = ConvertOptions::new().with_cancellation(token);
        let mut pipeline = pipeline(&[0; 5], &log).with_options(&options);

        assert!(matches!(pipeline.run(), Err(ConvertError::Cancelled)));
        assert_eq!(pipeline.summary().packets_read, 0);
        assert_eq!(pipeline.state(), PipelineState::Aborted);
    }

    #[test]
    fn decode_error_limit_is_configurable() {
        let log = Log::default();
        let options = ConvertOptions::new().with_max_decode_errors(1);
        let mut pipeline = pipeline(&[0, CORRUPT, 0], &log).with_options(&options);
        assert!(matches!(
            pipeline.run(),
            Err(ConvertError::DecodeErrorLimit { consecutive: 1, .. })
        ));
    }

    #[test]
    fn media_position_uses_time_base() {
        let packet = EncodedPacket::from_bytes(&[0], 0, Rational(1, 1000), Some(2500));
        assert_eq!(media_position(&packet), Some(Duration::from_millis(2500)));
        let packet = EncodedPacket::from_bytes(&[0], 0, Rational(1, 1000), None);
        assert_eq!(media_position(&packet), None);
    }

    #[test]
    fn summary_duration() {
        let summary = ConversionSummary {
            samples_encoded: 96_000,
            sample_rate: 48_000,
            ..Default::default()
        };
        assert_eq!(summary.duration(), Duration::from_secs(2));
        assert_eq!(ConversionSummary::default().duration(), Duration::ZERO);
    }
}
