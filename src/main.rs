use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{ArgAction, CommandFactory, ErrorKind, Parser, Subcommand};

use confound::audio::{AudioAnalyzer, AudioReader};
use confound::config::HashAlgorithm;
use confound::video::{VideoReader, VisualAnalyzer, VisualRun};
use confound::{output, util, Config};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Hash {
    Dct,
    Block,
}

impl From<Hash> for HashAlgorithm {
    fn from(h: Hash) -> Self {
        match h {
            Hash::Dct => HashAlgorithm::Dct,
            Hash::Block => HashAlgorithm::Block,
        }
    }
}

#[derive(clap::Args, Debug)]
struct VisualArgs {
    #[clap(
        short,
        long = "input",
        required = true,
        multiple_values = true,
        value_parser = clap::value_parser!(PathBuf),
        help = "Video files to analyze."
    )]
    inputs: Vec<PathBuf>,

    #[clap(
        short,
        long = "output",
        value_parser = clap::value_parser!(PathBuf),
        help = "Directory to write the output tables to."
    )]
    output_dir: PathBuf,

    #[clap(
        long,
        value_parser = clap::value_parser!(f64),
        help = "Sampling step, in seconds. By default every native frame is sampled."
    )]
    sample_step: Option<f64>,

    #[clap(
        long,
        value_parser = clap::value_parser!(f64),
        help = "Step used for the onset column of the output tables, in seconds. Defaults to the configured label step (0.04)."
    )]
    label_step: Option<f64>,

    #[clap(long, value_enum, help = "Perceptual hash algorithm.")]
    hash: Option<Hash>,

    #[clap(
        long,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Extract features on a single thread."
    )]
    single_threaded: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(after_help = "Displays info about confound and its dependencies.")]
    Info,

    #[clap(
        arg_required_else_help = true,
        after_help = "Computes quadrant luminance and frame hashes for each video, and writes one table per variable (brmean, brud, brlr, phash, md5sum) plus the perceptual difference table (normdiff)."
    )]
    Visual(VisualArgs),

    #[clap(
        arg_required_else_help = true,
        after_help = "Writes the raw per-quadrant luminance of each sampled frame (the _quadrants table)."
    )]
    Luminance(VisualArgs),

    #[clap(
        arg_required_else_help = true,
        after_help = "Writes the perceptual and content hash of each sampled frame (the _frame-hashes table)."
    )]
    Hashes(VisualArgs),

    #[clap(
        arg_required_else_help = true,
        after_help = "Recomputes the perceptual difference table from an existing phash table. The output is written next to the input, with _phash replaced by _normdiff."
    )]
    Diff {
        #[clap(value_parser = clap::value_parser!(PathBuf), help = "A phash table.")]
        path: PathBuf,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Computes the RMS power and the left/right RMS difference of each audio chunk, and writes the rms and lrdiff tables."
    )]
    Audio {
        #[clap(
            short,
            long = "input",
            required = true,
            multiple_values = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Media files to analyze."
        )]
        inputs: Vec<PathBuf>,

        #[clap(
            short,
            long = "output",
            value_parser = clap::value_parser!(PathBuf),
            help = "Directory to write the output tables to."
        )]
        output_dir: PathBuf,

        #[clap(
            long,
            value_parser = clap::value_parser!(u32),
            help = "Sample rate the audio is resampled to, in Hz."
        )]
        sample_rate: Option<u32>,

        #[clap(
            long,
            value_parser = clap::value_parser!(f64),
            help = "Chunk duration, in seconds."
        )]
        step: Option<f64>,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Extract features on a single thread."
        )]
        single_threaded: bool,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        global = true,
        value_parser = clap::value_parser!(PathBuf),
        help = "JSON configuration file. Command line flags take precedence over its values."
    )]
    config: Option<PathBuf>,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable debug logging."
    )]
    verbose: bool,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "By default, media files are validated using FFmpeg, which is extremely accurate. Setting this flag will switch to just checking file headers."
    )]
    file_headers_only: bool,
}

fn invalid(msg: impl std::fmt::Display) -> ! {
    let mut cmd = Cli::command();
    cmd.error(ErrorKind::InvalidValue, msg).exit();
}

impl Cli {
    fn validate(&self) {
        let positive = |name: &str, value: Option<f64>| {
            if let Some(v) = value {
                if !(v > 0.0) {
                    invalid(format!("{} must be a positive number", name));
                }
            }
        };
        match &self.command {
            Commands::Info | Commands::Diff { .. } => (),
            Commands::Visual(args) | Commands::Luminance(args) | Commands::Hashes(args) => {
                positive("sample_step", args.sample_step);
                positive("label_step", args.label_step);
            }
            Commands::Audio {
                sample_rate, step, ..
            } => {
                positive("step", *step);
                if *sample_rate == Some(0) {
                    invalid("sample_rate must be a positive number");
                }
            }
        }
    }

    fn load_config(&self) -> Config {
        let config = match &self.config {
            Some(path) => Config::from_path(path).unwrap_or_else(|e| {
                invalid(format!("failed to load {}: {}", path.display(), e))
            }),
            None => Config::default(),
        };
        let config = match &self.command {
            Commands::Visual(args) | Commands::Luminance(args) | Commands::Hashes(args) => {
                let mut config = config;
                if args.sample_step.is_some() {
                    config.visual.sample_step = args.sample_step;
                }
                if args.label_step.is_some() {
                    config.visual.label_step = args.label_step;
                }
                if let Some(hash) = args.hash {
                    config.visual.hash_algorithm = hash.into();
                }
                config
            }
            Commands::Audio {
                sample_rate, step, ..
            } => {
                let mut config = config;
                if let Some(sample_rate) = sample_rate {
                    config.audio.sample_rate = *sample_rate;
                }
                if let Some(step) = step {
                    config.audio.step = *step;
                }
                config
            }
            Commands::Info | Commands::Diff { .. } => config,
        };
        if let Err(e) = config.validate() {
            invalid(e);
        }
        config
    }

    fn find_media_files(&self, paths: &[PathBuf], audio: bool) -> Vec<PathBuf> {
        match util::find_media_files(paths, !self.file_headers_only, audio) {
            Err(e) => invalid(e),
            Ok(v) => v,
        }
    }
}

fn prepare_output_dir(dir: &Path) -> confound::Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn run_visual(
    args: &VisualArgs,
    videos: &[PathBuf],
    config: &Config,
    cancel: &Arc<AtomicBool>,
    write: impl Fn(&VisualRun, &Path, &Path) -> confound::Result<Vec<PathBuf>>,
) -> confound::Result<()> {
    prepare_output_dir(&args.output_dir)?;
    let analyzer = VisualAnalyzer::new(config.visual.clone())?
        .with_threading(!args.single_threaded)
        .with_cancel_flag(cancel.clone());

    for video in videos {
        tracing::info!(path = %video.display(), "analyzing video");
        let reader = VideoReader::open(video)?;
        let run = analyzer.run(reader)?;
        for path in write(&run, video, &args.output_dir)? {
            tracing::info!(path = %path.display(), rows = run.records.len(), "wrote table");
        }
    }
    Ok(())
}

fn main() -> confound::Result<()> {
    let args = Cli::parse();
    args.validate();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    ffmpeg_next::init()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let config = args.load_config();

    match &args.command {
        Commands::Visual(visual) => {
            let videos = args.find_media_files(&visual.inputs, false);
            run_visual(visual, &videos, &config, &cancel, |run, video, dir| {
                output::write_visual_tables(run, video, dir)
            })?;
        }
        Commands::Luminance(visual) => {
            let videos = args.find_media_files(&visual.inputs, false);
            run_visual(visual, &videos, &config, &cancel, |run, video, dir| {
                Ok(vec![output::write_quadrant_file(run, video, dir)?])
            })?;
        }
        Commands::Hashes(visual) => {
            let videos = args.find_media_files(&visual.inputs, false);
            run_visual(visual, &videos, &config, &cancel, |run, video, dir| {
                Ok(vec![output::write_frame_hash_file(run, video, dir)?])
            })?;
        }
        Commands::Diff { path } => {
            let out = output::diff_phash_file(path)?;
            tracing::info!(path = %out.display(), "wrote table");
        }
        Commands::Audio {
            inputs,
            output_dir,
            single_threaded,
            ..
        } => {
            let files = args.find_media_files(inputs, true);
            prepare_output_dir(output_dir)?;
            let analyzer = AudioAnalyzer::new(config.audio.clone())?
                .with_threading(!single_threaded)
                .with_cancel_flag(cancel.clone());

            for file in &files {
                tracing::info!(path = %file.display(), "analyzing audio");
                let reader = AudioReader::open(file, config.audio.sample_rate)?;
                let run = analyzer.run(reader)?;
                for path in output::write_audio_tables(&run, file, output_dir)? {
                    tracing::info!(path = %path.display(), rows = run.records.len(), "wrote table");
                }
            }
        }
        Commands::Info => {
            println!("FFmpeg version: {}", util::ffmpeg_version_string());
        }
    }

    Ok(())
}
