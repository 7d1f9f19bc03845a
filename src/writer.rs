//! Container writing (muxing).
//!
//! [`MediaSink`] enforces the muxer's call order: one stream declared, then
//! exactly one header, then packets, then exactly one trailer. Calls out of
//! order fail instead of producing a malformed file.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ffmpeg_next::{Rational, format::Flags as FormatFlags, format::context::Output};

use crate::encoder::AacEncoder;
use crate::error::{ConvertError, Stage};
use crate::packet::EncodedPacket;

/// Output container formats that can carry AAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputContainer {
    /// Raw AAC with ADTS frame headers (`.aac`).
    Adts,
    /// ISO base media file (`.mp4`).
    Mp4,
    /// MP4 variant for audio files (`.m4a`, `.m4b`).
    Ipod,
    /// Matroska (`.mka`).
    Matroska,
}

impl OutputContainer {
    /// FFmpeg muxer short name.
    pub fn muxer_name(self) -> &'static str {
        match self {
            OutputContainer::Adts => "adts",
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Ipod => "ipod",
            OutputContainer::Matroska => "matroska",
        }
    }

    /// Infer the container from a file extension (case-insensitive).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "aac" | "adts" => Some(OutputContainer::Adts),
            "mp4" => Some(OutputContainer::Mp4),
            "m4a" | "m4b" => Some(OutputContainer::Ipod),
            "mka" | "mkv" => Some(OutputContainer::Matroska),
            _ => None,
        }
    }

    /// Parse a container hint: a muxer name or a file extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "adts" | "aac" => Some(OutputContainer::Adts),
            "mp4" => Some(OutputContainer::Mp4),
            "ipod" | "m4a" | "m4b" => Some(OutputContainer::Ipod),
            "matroska" | "mka" | "mkv" => Some(OutputContainer::Matroska),
            _ => None,
        }
    }
}

impl Display for OutputContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.muxer_name())
    }
}

impl FromStr for OutputContainer {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OutputContainer::from_name(value).ok_or_else(|| {
            ConvertError::InvalidOption(format!(
                "unknown container '{value}' (expected adts, mp4, ipod or matroska)"
            ))
        })
    }
}

/// An open output container.
///
/// Dropping it closes the file. A sink dropped after its header but before
/// its trailer leaves an unplayable file behind; this is logged.
pub struct MediaSink {
    output: Output,
    path: PathBuf,
    container: OutputContainer,
    stream: Option<usize>,
    source_time_base: Rational,
    header_written: bool,
    trailer_written: bool,
    last_dts: Option<i64>,
    packets_written: u64,
    bytes_written: u64,
}

impl MediaSink {
    /// Create the output file for `container`. The file exists once this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Create`] if the file cannot be created or the
    /// muxer is unavailable.
    pub fn create<P: AsRef<Path>>(path: P, container: OutputContainer) -> Result<Self, ConvertError> {
        let path = path.as_ref().to_path_buf();

        ffmpeg_next::init().map_err(|error| ConvertError::Create {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let output = ffmpeg_next::format::output_as(&path, container.muxer_name()).map_err(
            |error| ConvertError::Create {
                path: path.clone(),
                reason: error.to_string(),
            },
        )?;

        log::debug!("Created {} output: {}", container, path.display());

        Ok(Self {
            output,
            path,
            container,
            stream: None,
            source_time_base: Rational(1, 1),
            header_written: false,
            trailer_written: false,
            last_dts: None,
            packets_written: 0,
            bytes_written: 0,
        })
    }

    /// Whether the container wants codec extradata in its header. The
    /// encoder must be opened with that flag to match.
    pub fn requires_global_header(&self) -> bool {
        self.output.format().flags().contains(FormatFlags::GLOBAL_HEADER)
    }

    /// Declare the single output stream from the opened encoder's
    /// parameters. Returns the stream index.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Header`] if a stream was already declared, the
    /// header was already written, or the muxer refuses the stream.
    pub fn declare_stream(&mut self, encoder: &AacEncoder) -> Result<usize, ConvertError> {
        if self.stream.is_some() || self.header_written {
            return Err(ConvertError::Header(
                "output stream already declared".to_string(),
            ));
        }

        let mut stream = self
            .output
            .add_stream(encoder.codec())
            .map_err(header_error)?;
        stream.set_parameters(encoder.encoder());
        stream.set_time_base(encoder.time_base());
        let index = stream.index();

        self.stream = Some(index);
        self.source_time_base = encoder.time_base();
        Ok(index)
    }

    /// Write the container header. Must follow
    /// [`declare_stream`](MediaSink::declare_stream) and happen once.
    pub fn write_header(&mut self) -> Result<(), ConvertError> {
        if self.header_written {
            return Err(ConvertError::Header("header already written".to_string()));
        }
        if self.stream.is_none() {
            return Err(ConvertError::Header(
                "no output stream declared".to_string(),
            ));
        }
        self.output.write_header().map_err(header_error)?;
        self.header_written = true;
        log::debug!("Wrote {} header to {}", self.container, self.path.display());
        Ok(())
    }

    /// Mux one encoded packet.
    ///
    /// Timestamps are rescaled from the encoder time base to the stream's
    /// time base chosen by the muxer. DTS is kept strictly increasing.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Write`] before the header, after the trailer,
    /// or on an I/O fault.
    pub fn write_packet(&mut self, mut packet: EncodedPacket) -> Result<(), ConvertError> {
        if !self.header_written {
            return Err(ConvertError::Write("header not written yet".to_string()));
        }
        if self.trailer_written {
            return Err(ConvertError::Write("trailer already written".to_string()));
        }
        let Some(index) = self.stream else {
            return Err(ConvertError::Write("no output stream declared".to_string()));
        };
        let stream_time_base = self
            .output
            .stream(index)
            .map(|stream| stream.time_base())
            .unwrap_or(self.source_time_base);

        if packet.time_base() != self.source_time_base {
            log::debug!(
                "Packet time base {} differs from encoder time base {}",
                packet.time_base(),
                self.source_time_base
            );
        }
        packet.retarget(index, stream_time_base);
        self.enforce_monotonic_dts(&mut packet);

        let size = packet.size() as u64;
        packet
            .as_packet_mut()
            .write_interleaved(&mut self.output)
            .map_err(|error| ConvertError::from_ffmpeg(Stage::Writer, error, ConvertError::Write))?;

        self.packets_written += 1;
        self.bytes_written += size;
        Ok(())
    }

    /// Finalize the container. Must be the last call and happen once.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Trailer`] if the header was never written,
    /// the trailer was already written, or the muxer fails. In the last
    /// case the output file is invalid.
    pub fn write_trailer(&mut self) -> Result<(), ConvertError> {
        if !self.header_written {
            return Err(ConvertError::Trailer("header was never written".to_string()));
        }
        if self.trailer_written {
            return Err(ConvertError::Trailer("trailer already written".to_string()));
        }
        self.output
            .write_trailer()
            .map_err(|error| ConvertError::from_ffmpeg(Stage::Writer, error, ConvertError::Trailer))?;
        self.trailer_written = true;

        log::debug!(
            "Finalized {} ({} packets, {} bytes)",
            self.path.display(),
            self.packets_written,
            self.bytes_written
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn container(&self) -> OutputContainer {
        self.container
    }

    pub fn is_finalized(&self) -> bool {
        self.trailer_written
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn enforce_monotonic_dts(&mut self, packet: &mut EncodedPacket) {
        let Some(dts) = packet.dts().or(packet.pts()) else {
            return;
        };
        let dts = match self.last_dts {
            Some(last) if dts <= last => {
                let fixed = last + 1;
                let inner = packet.as_packet_mut();
                inner.set_dts(Some(fixed));
                if inner.pts().is_some_and(|pts| pts < fixed) {
                    inner.set_pts(Some(fixed));
                }
                fixed
            }
            _ => dts,
        };
        self.last_dts = Some(dts);
    }
}

impl Drop for MediaSink {
    fn drop(&mut self) {
        if self.header_written && !self.trailer_written {
            log::warn!(
                "Closing {} without a trailer; the file is incomplete",
                self.path.display()
            );
        }
    }
}

impl std::fmt::Debug for MediaSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSink")
            .field("path", &self.path)
            .field("container", &self.container)
            .field("header_written", &self.header_written)
            .field("trailer_written", &self.trailer_written)
            .field("packets_written", &self.packets_written)
            .finish()
    }
}

fn header_error(error: ffmpeg_next::Error) -> ConvertError {
    ConvertError::from_ffmpeg(Stage::Writer, error, ConvertError::Header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_extension() {
        assert_eq!(OutputContainer::from_path("a/b/song.aac"), Some(OutputContainer::Adts));
        assert_eq!(OutputContainer::from_path("song.M4A"), Some(OutputContainer::Ipod));
        assert_eq!(OutputContainer::from_path("book.m4b"), Some(OutputContainer::Ipod));
        assert_eq!(OutputContainer::from_path("clip.mp4"), Some(OutputContainer::Mp4));
        assert_eq!(OutputContainer::from_path("song.mka"), Some(OutputContainer::Matroska));
        assert_eq!(OutputContainer::from_path("song.wav"), None);
        assert_eq!(OutputContainer::from_path("no_extension"), None);
    }

    #[test]
    fn container_from_name() {
        assert_eq!("ADTS".parse::<OutputContainer>().ok(), Some(OutputContainer::Adts));
        assert_eq!("ipod".parse::<OutputContainer>().ok(), Some(OutputContainer::Ipod));
        assert_eq!("matroska".parse::<OutputContainer>().ok(), Some(OutputContainer::Matroska));
        assert!(matches!(
            "ogg".parse::<OutputContainer>(),
            Err(ConvertError::InvalidOption(_))
        ));
        assert_eq!(OutputContainer::Ipod.to_string(), "ipod");
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.aac");
        let mut sink = MediaSink::create(&path, OutputContainer::Adts).unwrap();
        assert!(path.exists());

        assert!(matches!(sink.write_header(), Err(ConvertError::Header(_))));
        let packet = EncodedPacket::from_bytes(&[0; 4], 0, Rational(1, 44_100), Some(0));
        assert!(matches!(sink.write_packet(packet), Err(ConvertError::Write(_))));
        assert!(matches!(sink.write_trailer(), Err(ConvertError::Trailer(_))));
        assert!(!sink.is_finalized());
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let error = MediaSink::create("/no/such/dir/out.m4a", OutputContainer::Ipod).unwrap_err();
        assert!(matches!(error, ConvertError::Create { .. }));
        assert_eq!(error.stage(), Stage::Writer);
    }
}
