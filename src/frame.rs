//! Raw sample frames and their format descriptor.
//!
//! [`RawFrame`] is the unit handed from the decoder to the resampler and
//! from the resampler to the encoder. It owns its samples; passing a frame
//! to the next stage moves it.

use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::{ChannelLayout, format::Sample, frame::Audio as AudioFrame};

/// Sample format, sample rate and channel layout of a stream of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Sample format (e.g. `F32(Planar)`).
    pub format: Sample,
    /// Samples per second per channel.
    pub rate: u32,
    /// Channel layout. Never empty once normalised by [`SampleSpec::new`].
    pub layout: ChannelLayout,
}

impl SampleSpec {
    /// Build a spec, deriving a default layout when `layout` is empty.
    ///
    /// Some demuxers (raw PCM, some WAV files) leave the layout unset and
    /// only report a channel count; `channels` is used in that case.
    pub fn new(format: Sample, rate: u32, layout: ChannelLayout, channels: u16) -> Self {
        let layout = if layout.is_empty() || layout.channels() <= 0 {
            layout_for_channels(channels)
        } else {
            layout
        };
        Self {
            format,
            rate,
            layout,
        }
    }

    /// Number of channels in the layout.
    pub fn channels(&self) -> u16 {
        u16::try_from(self.layout.channels()).unwrap_or(0)
    }

    /// Number of data planes a frame with this spec carries.
    pub fn planes(&self) -> usize {
        if self.format.is_planar() {
            self.channels() as usize
        } else {
            1
        }
    }

    /// Bytes one sample of one channel occupies.
    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes()
    }
}

impl Display for SampleSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.rate,
            self.channels(),
            self.format.name()
        )
    }
}

/// The default layout for a bare channel count.
///
/// Counts above eight take FFmpeg's default for that count, which may be an
/// unspecified order. The channel count is always kept.
pub fn layout_for_channels(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        3 => ChannelLayout::SURROUND,
        4 => ChannelLayout::QUAD,
        5 => ChannelLayout::_5POINT0,
        6 => ChannelLayout::_5POINT1,
        7 => ChannelLayout::_6POINT1,
        8 => ChannelLayout::_7POINT1,
        _ => ChannelLayout::default(i32::from(channels)),
    }
}

/// A block of decoded (or pre-encode) samples with its presentation
/// timestamp.
#[derive(Clone)]
pub struct RawFrame {
    inner: AudioFrame,
}

impl RawFrame {
    /// Wrap an FFmpeg frame. The spec is read from the frame itself.
    pub fn new(inner: AudioFrame) -> Self {
        Self { inner }
    }

    /// A zero-filled frame of `samples` samples per channel.
    ///
    /// Zero is silence for every format except unsigned 8-bit, which is
    /// centred on 0x80.
    pub fn silence(spec: SampleSpec, samples: usize) -> Self {
        let mut inner = AudioFrame::new(spec.format, samples, spec.layout);
        inner.set_rate(spec.rate);
        let fill = match spec.format {
            Sample::U8(_) => 0x80,
            _ => 0,
        };
        for plane in 0..spec.planes() {
            inner.data_mut(plane).fill(fill);
        }
        Self { inner }
    }

    /// Format descriptor of this frame.
    pub fn spec(&self) -> SampleSpec {
        SampleSpec::new(
            self.inner.format(),
            self.inner.rate(),
            self.inner.channel_layout(),
            self.inner.channels(),
        )
    }

    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.inner.samples()
    }

    /// Presentation timestamp, in the time base of the stage that produced
    /// the frame.
    pub fn pts(&self) -> Option<i64> {
        self.inner.pts()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.inner.set_pts(pts);
    }

    /// The valid bytes of plane `index`.
    ///
    /// FFmpeg pads plane buffers; this slice stops at the last real sample.
    /// Returns an empty slice for an out-of-range plane.
    pub fn plane(&self, index: usize) -> &[u8] {
        let spec = self.spec();
        if index >= spec.planes() {
            return &[];
        }
        let mut len = self.samples() * spec.bytes_per_sample();
        if !spec.format.is_planar() {
            len *= spec.channels() as usize;
        }
        let data = self.inner.data(index);
        &data[..len.min(data.len())]
    }

    pub(crate) fn as_frame(&self) -> &AudioFrame {
        &self.inner
    }

    pub(crate) fn as_frame_mut(&mut self) -> &mut AudioFrame {
        &mut self.inner
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RawFrame")
            .field("spec", &self.spec())
            .field("samples", &self.samples())
            .field("pts", &self.pts())
            .finish()
    }
}
