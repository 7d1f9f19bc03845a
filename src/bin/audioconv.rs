use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use audioconv::{
    ChannelPolicy, ConvertOptions, Converter, FfmpegLogLevel, MediaSource, OutputContainer,
    ProgressCallback, ProgressInfo, ThreadCount,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  audioconv convert input.wav output.m4a\n  audioconv convert input.flac output.aac --bitrate 128000 --threads 4 --progress\n  audioconv probe input.mkv --json\n  audioconv completions zsh > _audioconv";

#[derive(Debug, Parser)]
#[command(
    name = "audioconv",
    version,
    about = "Convert the audio stream of a media file to AAC",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging (RUST_LOG overrides).
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert the first audio stream of a file to AAC.
    #[command(
        about = "Convert audio to AAC",
        after_help = "Examples:\n  audioconv convert input.wav output.m4a\n  audioconv convert input.mkv out.bin --format adts --channels stereo"
    )]
    Convert {
        /// Input media path.
        input: PathBuf,
        /// Output path; the extension picks the container unless --format is given.
        output: PathBuf,
        /// Codec thread count.
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Target bit rate in bits per second.
        #[arg(long, default_value_t = audioconv::DEFAULT_BIT_RATE)]
        bitrate: usize,
        /// Channel handling: preserve | mono | stereo.
        #[arg(long, default_value = "preserve")]
        channels: String,
        /// Force an output sample rate in Hz.
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Output container: adts | mp4 | ipod | matroska.
        #[arg(long)]
        format: Option<String>,
        /// Abort after this many undecodable packets in a row.
        #[arg(long, default_value_t = audioconv::DEFAULT_MAX_DECODE_ERRORS)]
        max_decode_errors: usize,
        /// Keep the partial output if the conversion fails.
        #[arg(long)]
        keep_partial: bool,
        /// Allow overwriting an existing output file.
        #[arg(long)]
        overwrite: bool,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
    },

    /// Print the streams of a media file.
    #[command(
        about = "Print stream information",
        visible_alias = "info",
        after_help = "Examples:\n  audioconv probe input.mp4\n  audioconv probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);

    match &global.log_level {
        Some(level) => {
            let parsed: FfmpegLogLevel = level.parse()?;
            audioconv::set_ffmpeg_log_level(parsed);
        }
        None if !global.verbose => audioconv::set_ffmpeg_log_level(FfmpegLogLevel::Error),
        None => {}
    }
    Ok(())
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos:>3}% {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.percentage {
            Some(percentage) => self.bar.set_position(percentage.clamp(0.0, 100.0) as u64),
            None => self.bar.tick(),
        }
        let eta = info
            .estimated_remaining
            .map(|eta| format!(", eta {:.0}s", eta.as_secs_f64()))
            .unwrap_or_default();
        self.bar
            .set_message(format!("{} packets{eta}", info.packets_read));
    }
}

struct ConvertArgs {
    threads: usize,
    bitrate: usize,
    channels: String,
    sample_rate: Option<u32>,
    format: Option<String>,
    max_decode_errors: usize,
    keep_partial: bool,
}

fn build_options(args: &ConvertArgs) -> Result<ConvertOptions, Box<dyn std::error::Error>> {
    let mut options = ConvertOptions::new()
        .with_threads(ThreadCount::new(args.threads)?)
        .with_bit_rate(args.bitrate)
        .with_channel_policy(args.channels.parse::<ChannelPolicy>()?)
        .with_max_decode_errors(args.max_decode_errors)
        .with_keep_partial_output(args.keep_partial);

    if let Some(rate) = args.sample_rate {
        options = options.with_sample_rate(rate);
    }
    if let Some(format) = &args.format {
        options = options.with_container(format.parse::<OutputContainer>()?);
    }
    Ok(options)
}

fn probe(input: &Path, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = MediaSource::open(input)?;
    let format = source.format_name().to_string();
    let duration = source.duration();
    let streams = source.probe()?.to_vec();

    if as_json {
        let payload = json!({
            "path": input.display().to_string(),
            "format": format,
            "duration_seconds": duration.map(|d| d.as_secs_f64()),
            "streams": streams.iter().map(|stream| json!({
                "index": stream.index,
                "kind": stream.kind.to_string(),
                "codec": stream.codec_name,
                "sample_rate": (stream.sample_rate > 0).then_some(stream.sample_rate),
                "channels": (stream.channels > 0).then_some(stream.channels),
                "sample_format": stream.sample_format.map(|f| f.name()),
                "bit_rate": (stream.bit_rate > 0).then_some(stream.bit_rate),
                "duration_seconds": stream.duration.map(|d| d.as_secs_f64()),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{} {}", "File:".bold(), input.display());
    println!("{} {format}", "Format:".bold());
    if let Some(duration) = duration {
        println!("{} {:.3}s", "Duration:".bold(), duration.as_secs_f64());
    }
    for stream in &streams {
        let mut line = format!("  #{} {} ({})", stream.index, stream.kind, stream.codec_name);
        if stream.sample_rate > 0 {
            line.push_str(&format!(", {} Hz, {} ch", stream.sample_rate, stream.channels));
        }
        if let Some(sample_format) = stream.sample_format {
            line.push_str(&format!(", {}", sample_format.name()));
        }
        if stream.bit_rate > 0 {
            line.push_str(&format!(", {} kb/s", stream.bit_rate / 1000));
        }
        println!("{line}");
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Convert {
            input,
            output,
            threads,
            bitrate,
            channels,
            sample_rate,
            format,
            max_decode_errors,
            keep_partial,
            overwrite,
            progress,
        } => {
            let args = ConvertArgs {
                threads,
                bitrate,
                channels,
                sample_rate,
                format,
                max_decode_errors,
                keep_partial,
            };
            let mut options = build_options(&args)?;
            ensure_writable_path(&output, overwrite)?;

            let terminal = if progress {
                let terminal = Arc::new(TerminalProgress::new()?);
                options = options.with_progress(terminal.clone());
                Some(terminal)
            } else {
                None
            };

            let result = Converter::new(&input, &output).options(options).run();
            if let Some(terminal) = &terminal {
                terminal.bar.finish_and_clear();
            }
            let summary = result?;

            if summary.decode_errors > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("skipped {} undecodable packet(s)", summary.decode_errors).yellow()
                );
            }
            println!(
                "{} {} -> {} ({:.2}s, {} packets, {} bytes)",
                "converted".green().bold(),
                input.display(),
                output.display(),
                summary.duration().as_secs_f64(),
                summary.packets_written,
                summary.bytes_written
            );
        }
        Commands::Probe { input, json } => probe(&input, json)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "audioconv", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConvertArgs {
        ConvertArgs {
            threads: 2,
            bitrate: 96_000,
            channels: "stereo".to_string(),
            sample_rate: None,
            format: None,
            max_decode_errors: 3,
            keep_partial: false,
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_convert_flags() {
        let cli = Cli::try_parse_from([
            "audioconv",
            "convert",
            "in.wav",
            "out.m4a",
            "--threads",
            "4",
            "--channels",
            "mono",
            "--keep-partial",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert {
                threads,
                channels,
                keep_partial,
                bitrate,
                ..
            } => {
                assert_eq!(threads, 4);
                assert_eq!(channels, "mono");
                assert!(keep_partial);
                assert_eq!(bitrate, 64_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn options_from_arguments() {
        let options = build_options(&args()).unwrap();
        assert_eq!(options.threads().get(), 2);
        assert_eq!(options.bit_rate(), 96_000);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let mut bad = args();
        bad.threads = 0;
        assert!(build_options(&bad).is_err());

        let mut bad = args();
        bad.channels = "quad".to_string();
        assert!(build_options(&bad).is_err());

        let mut bad = args();
        bad.format = Some("ogg".to_string());
        assert!(build_options(&bad).is_err());
    }

    #[test]
    fn existing_output_needs_overwrite() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ensure_writable_path(file.path(), false).is_err());
        assert!(ensure_writable_path(file.path(), true).is_ok());
        assert!(ensure_writable_path(Path::new("/nonexistent/out.m4a"), false).is_ok());
    }
}
