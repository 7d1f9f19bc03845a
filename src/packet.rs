//! Compressed packets as they move between the reader, decoder, encoder and
//! writer.

use ffmpeg_next::{Packet, Rational};

/// Compressed bytes with their timestamps, stream tag and time base.
///
/// Packets read from the input for streams other than the selected audio
/// stream are still produced, with [`is_skip`](EncodedPacket::is_skip) set,
/// so the driver sees the container's read order.
pub struct EncodedPacket {
    inner: Packet,
    stream_index: usize,
    time_base: Rational,
    skip: bool,
}

impl EncodedPacket {
    /// Wrap an FFmpeg packet belonging to `stream_index`, whose timestamps
    /// are in `time_base`.
    pub fn new(inner: Packet, stream_index: usize, time_base: Rational) -> Self {
        Self {
            inner,
            stream_index,
            time_base,
            skip: false,
        }
    }

    /// Build a packet from raw bytes. Mostly useful for feeding decoders
    /// directly and in tests.
    pub fn from_bytes(data: &[u8], stream_index: usize, time_base: Rational, pts: Option<i64>) -> Self {
        let mut inner = Packet::copy(data);
        inner.set_pts(pts);
        inner.set_dts(pts);
        inner.set_stream(stream_index);
        Self::new(inner, stream_index, time_base)
    }

    pub(crate) fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Whether this packet belongs to a stream other than the selected one.
    pub fn is_skip(&self) -> bool {
        self.skip
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn pts(&self) -> Option<i64> {
        self.inner.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.inner.dts()
    }

    /// Duration in [`time_base`](EncodedPacket::time_base) units, 0 if unknown.
    pub fn duration(&self) -> i64 {
        self.inner.duration()
    }

    /// The compressed payload. Empty for a zero-sized packet.
    pub fn data(&self) -> &[u8] {
        self.inner.data().unwrap_or(&[])
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub(crate) fn as_packet(&self) -> &Packet {
        &self.inner
    }

    pub(crate) fn as_packet_mut(&mut self) -> &mut Packet {
        &mut self.inner
    }

    /// Re-tag the packet for an output stream, converting its timestamps.
    pub(crate) fn retarget(&mut self, stream_index: usize, time_base: Rational) {
        self.inner.rescale_ts(self.time_base, time_base);
        self.inner.set_stream(stream_index);
        self.inner.set_position(-1);
        self.stream_index = stream_index;
        self.time_base = time_base;
    }
}

impl std::fmt::Debug for EncodedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPacket")
            .field("stream_index", &self.stream_index)
            .field("pts", &self.pts())
            .field("dts", &self.dts())
            .field("size", &self.size())
            .field("skip", &self.skip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_keeps_payload_and_timestamps() {
        let packet = EncodedPacket::from_bytes(&[1, 2, 3], 2, Rational(1, 44_100), Some(1024));
        assert_eq!(packet.data(), &[1, 2, 3]);
        assert_eq!(packet.stream_index(), 2);
        assert_eq!(packet.pts(), Some(1024));
        assert!(!packet.is_skip());
        assert!(packet.skipped().is_skip());
    }

    #[test]
    fn retarget_rescales_timestamps() {
        let mut packet = EncodedPacket::from_bytes(&[0; 8], 0, Rational(1, 48_000), Some(48_000));
        packet.retarget(1, Rational(1, 1000));
        assert_eq!(packet.pts(), Some(1000));
        assert_eq!(packet.dts(), Some(1000));
        assert_eq!(packet.stream_index(), 1);
        assert_eq!(packet.time_base(), Rational(1, 1000));
    }
}
