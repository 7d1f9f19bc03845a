//! Sample format, rate and channel layout conversion.
//!
//! [`Resampler`] wraps libswresample. When the decoder already produces what
//! the encoder wants it does not create a conversion context at all and
//! hands frames through untouched.
//!
//! Output timestamps are a running sample count in `1 / output_rate`, so
//! the encoder sees a gapless sequence regardless of the input timestamps.

use ffmpeg_next::{frame::Audio as AudioFrame, software::resampling::Context as ResamplingContext};

use crate::error::{ConvertError, Stage};
use crate::frame::{RawFrame, SampleSpec};

/// Extra output capacity on top of the rate-scaled input size.
const OUTPUT_HEADROOM: usize = 32;

/// Upper bound on flush rounds; each round drains what the delay line holds.
const MAX_FLUSH_ROUNDS: usize = 8;

/// Conversion state between the decoder's format and the encoder's.
pub struct Resampler {
    context: Option<ResamplingContext>,
    input: SampleSpec,
    output: SampleSpec,
    frames_seen: u64,
    reconfigured: bool,
    next_pts: i64,
    flushed: bool,
}

impl Resampler {
    /// Configure a conversion from `input` to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Resample`] if libswresample rejects the pair of
    /// formats, or [`ConvertError::Allocation`] when out of memory.
    pub fn configure(input: SampleSpec, output: SampleSpec) -> Result<Self, ConvertError> {
        let context = build_context(input, output)?;
        match &context {
            Some(_) => log::debug!("Resampling {input} -> {output}"),
            None => log::debug!("Resampler passthrough ({input})"),
        }
        Ok(Self {
            context,
            input,
            output,
            frames_seen: 0,
            reconfigured: false,
            next_pts: 0,
            flushed: false,
        })
    }

    /// Whether frames pass through without conversion.
    pub fn is_passthrough(&self) -> bool {
        self.context.is_none()
    }

    pub fn input_spec(&self) -> SampleSpec {
        self.input
    }

    pub fn output_spec(&self) -> SampleSpec {
        self.output
    }

    /// Convert one frame. Rate conversion buffers internally, so the result
    /// may hold zero frames.
    ///
    /// The first frame may differ from the configured input format (some
    /// decoders only settle their output format after the first packet); the
    /// resampler reconfigures once in that case. Any later format change is
    /// an error.
    pub fn convert(&mut self, frame: RawFrame) -> Result<Vec<RawFrame>, ConvertError> {
        if self.flushed {
            return Err(ConvertError::StageFlushed {
                stage: Stage::Resampler,
            });
        }

        let spec = frame.spec();
        if spec != self.input {
            if self.frames_seen == 0 && !self.reconfigured {
                log::debug!(
                    "Decoder output changed before the first frame ({} -> {spec}), reconfiguring",
                    self.input
                );
                self.context = build_context(spec, self.output)?;
                self.input = spec;
                self.reconfigured = true;
            } else {
                return Err(ConvertError::Resample(format!(
                    "input format changed mid-stream from {} to {spec}",
                    self.input
                )));
            }
        }
        self.frames_seen += 1;

        let Some(context) = self.context.as_mut() else {
            let mut frame = frame;
            frame.set_pts(Some(self.next_pts));
            self.next_pts += frame.samples() as i64;
            return Ok(vec![frame]);
        };

        let pending = context.delay().map_or(0, |delay| delay.output.max(0) as usize);
        let scaled = (frame.samples() as u64 * u64::from(self.output.rate))
            .div_ceil(u64::from(self.input.rate.max(1))) as usize;
        let mut converted = allocate(self.output, scaled + pending + OUTPUT_HEADROOM);

        context
            .run(frame.as_frame(), &mut converted)
            .map_err(resample_error)?;

        Ok(self.stamp(converted).into_iter().collect())
    }

    /// Drain the delay line at end of input.
    ///
    /// A second call is a no-op. Errors while draining are logged and end
    /// the flush; whatever was drained before is still returned.
    pub fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
        if self.flushed {
            log::debug!("Resampler already flushed");
            return Ok(Vec::new());
        }
        self.flushed = true;

        let mut frames = Vec::new();
        for _ in 0..MAX_FLUSH_ROUNDS {
            let Some(context) = self.context.as_mut() else {
                break;
            };
            let pending = match context.delay() {
                Some(delay) if delay.output > 0 => delay.output as usize,
                _ => break,
            };

            let mut tail = allocate(self.output, pending + OUTPUT_HEADROOM);
            if let Err(error) = context.flush(&mut tail) {
                log::debug!("Resampler flush stopped early: {error}");
                break;
            }
            match self.stamp(tail) {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }

        log::debug!("Resampler flushed {} trailing frame(s)", frames.len());
        Ok(frames)
    }

    /// Assign the running sample position as PTS. Empty frames are dropped.
    fn stamp(&mut self, mut frame: AudioFrame) -> Option<RawFrame> {
        let samples = frame.samples();
        if samples == 0 {
            return None;
        }
        frame.set_pts(Some(self.next_pts));
        self.next_pts += samples as i64;
        Some(RawFrame::new(frame))
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("passthrough", &self.is_passthrough())
            .field("flushed", &self.flushed)
            .finish()
    }
}

fn build_context(
    input: SampleSpec,
    output: SampleSpec,
) -> Result<Option<ResamplingContext>, ConvertError> {
    if input == output {
        return Ok(None);
    }
    ResamplingContext::get(
        input.format,
        input.layout,
        input.rate,
        output.format,
        output.layout,
        output.rate,
    )
    .map(Some)
    .map_err(resample_error)
}

/// A frame with room for `capacity` samples; swr fills it and sets the
/// real sample count.
fn allocate(spec: SampleSpec, capacity: usize) -> AudioFrame {
    let mut frame = AudioFrame::new(spec.format, capacity, spec.layout);
    frame.set_rate(spec.rate);
    frame
}

fn resample_error(error: ffmpeg_next::Error) -> ConvertError {
    ConvertError::from_ffmpeg(Stage::Resampler, error, ConvertError::Resample)
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{ChannelLayout, format::Sample, format::sample::Type};

    use super::*;

    fn s16_stereo(rate: u32) -> SampleSpec {
        SampleSpec::new(Sample::I16(Type::Packed), rate, ChannelLayout::STEREO, 2)
    }

    fn fltp_stereo(rate: u32) -> SampleSpec {
        SampleSpec::new(Sample::F32(Type::Planar), rate, ChannelLayout::STEREO, 2)
    }

    /// A packed s16 stereo ramp, so conversions have something non-trivial
    /// to chew on.
    fn ramp(spec: SampleSpec, samples: usize, offset: usize) -> RawFrame {
        let mut frame = RawFrame::silence(spec, samples);
        let data = frame.as_frame_mut().data_mut(0);
        for i in 0..samples * 2 {
            let value = (((offset * 2 + i) * 37) % 20_000) as i16 - 10_000;
            data[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        frame
    }

    fn run(resampler: &mut Resampler, frames: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let spec = resampler.input_spec();
        for n in 0..frames {
            for frame in resampler.convert(ramp(spec, 1000, n * 1000)).unwrap() {
                out.push(frame.plane(0).to_vec());
                out.push(frame.plane(1).to_vec());
            }
        }
        for frame in resampler.flush().unwrap() {
            out.push(frame.plane(0).to_vec());
            out.push(frame.plane(1).to_vec());
        }
        out
    }

    #[test]
    fn identical_specs_pass_through() {
        let mut resampler = Resampler::configure(fltp_stereo(48_000), fltp_stereo(48_000)).unwrap();
        assert!(resampler.is_passthrough());

        let out = resampler.convert(RawFrame::silence(fltp_stereo(48_000), 1024)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples(), 1024);
        assert_eq!(out[0].pts(), Some(0));

        let out = resampler.convert(RawFrame::silence(fltp_stereo(48_000), 512)).unwrap();
        assert_eq!(out[0].pts(), Some(1024));
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn conversion_is_deterministic() {
        let mut first = Resampler::configure(s16_stereo(44_100), fltp_stereo(48_000)).unwrap();
        let mut second = Resampler::configure(s16_stereo(44_100), fltp_stereo(48_000)).unwrap();
        assert!(!first.is_passthrough());
        assert_eq!(run(&mut first, 5), run(&mut second, 5));
    }

    #[test]
    fn upsampling_keeps_every_sample() {
        let mut resampler = Resampler::configure(s16_stereo(22_050), fltp_stereo(44_100)).unwrap();
        let mut total = 0;
        for n in 0..10 {
            for frame in resampler.convert(ramp(s16_stereo(22_050), 1000, n * 1000)).unwrap() {
                total += frame.samples();
            }
        }
        for frame in resampler.flush().unwrap() {
            total += frame.samples();
        }
        // 10 000 input samples at twice the rate, give or take filter edges.
        assert!((19_900..=20_100).contains(&total), "got {total} samples");
    }

    #[test]
    fn pts_counts_output_samples() {
        let mut resampler = Resampler::configure(s16_stereo(48_000), fltp_stereo(48_000)).unwrap();
        let mut expected = 0;
        for n in 0..4 {
            for frame in resampler.convert(ramp(s16_stereo(48_000), 700, n * 700)).unwrap() {
                assert_eq!(frame.pts(), Some(expected));
                expected += frame.samples() as i64;
            }
        }
    }

    #[test]
    fn convert_after_flush_is_rejected() {
        let mut resampler = Resampler::configure(s16_stereo(44_100), fltp_stereo(44_100)).unwrap();
        resampler.flush().unwrap();
        assert!(resampler.flush().unwrap().is_empty());
        let error = resampler.convert(ramp(s16_stereo(44_100), 10, 0)).unwrap_err();
        assert!(matches!(
            error,
            ConvertError::StageFlushed {
                stage: Stage::Resampler
            }
        ));
    }

    #[test]
    fn reconfigures_once_then_rejects_format_changes() {
        let mut resampler = Resampler::configure(s16_stereo(44_100), fltp_stereo(44_100)).unwrap();
        resampler.convert(ramp(s16_stereo(48_000), 100, 0)).unwrap();
        assert_eq!(resampler.input_spec().rate, 48_000);

        let error = resampler.convert(ramp(s16_stereo(44_100), 100, 0)).unwrap_err();
        assert!(matches!(error, ConvertError::Resample(_)));
    }
}
