use anyhow::{anyhow, Context, Result};
use asciivid::params::{discover_media_files, parse_width, resolve_input, resolve_output};
use asciivid::{AppConfig, AsciiVideoConverter, ColorMode, ConversionError, ConversionOptions, Progress};
use clap::Parser;
use dialoguer::{FuzzySelect, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

const CONFIG_NAMES: &[&str] = &["asciivid.toml", "asciivid.json"];

fn load_config() -> Result<AppConfig> {
    // App data dir first, then current dir, then built-in defaults
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(d) = dirs::data_dir() {
        for name in CONFIG_NAMES {
            tried.push(d.join("asciivid").join(name));
        }
    }
    for name in CONFIG_NAMES {
        tried.push(PathBuf::from(name));
    }

    for p in &tried {
        if p.is_file() {
            log::info!("using config {}", p.display());
            return AppConfig::from_file(p);
        }
    }
    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Render a video as ASCII art, keeping its audio.")]
struct Args {
    /// Input video, with or without extension (.mp4, .avi, .mov, .mkv)
    input: Option<PathBuf>,

    /// Output video; `.mp4` is appended when missing
    out: Option<PathBuf>,

    /// Grid width in characters (at least 4)
    #[arg(long, short = 'w')]
    width: Option<String>,

    /// Glyph color: accent (green) or true-color
    #[arg(long, short = 'm')]
    mode: Option<ColorMode>,

    /// Height-to-width ratio of a character cell
    #[arg(long)]
    cell_aspect: Option<f32>,

    /// TrueType font to render glyphs with
    #[arg(long)]
    font: Option<PathBuf>,

    /// Font size in pixels (with --font)
    #[arg(long)]
    font_size: Option<f32>,

    /// Leave the result silent instead of copying the source audio
    #[arg(long, default_value_t = false)]
    no_audio: bool,

    /// Use default quality preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["small", "large"])]
    default: bool,

    /// Use the small preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "large"])]
    small: bool,

    /// Use the large preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "small"])]
    large: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = Args::parse();
    let is_interactive = !(args.default || args.small || args.large);

    // --- Input selection ---
    if args.input.is_none() {
        if !is_interactive {
            return Err(anyhow!("Input file must be provided when using a preset."));
        }
        let files = discover_media_files(&PathBuf::from("."));
        if files.is_empty() {
            return Err(anyhow!("No video files found in current directory."));
        }
        let labels: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
            .with_prompt("Choose an input video")
            .default(0)
            .items(&labels)
            .interact()?;
        args.input = Some(files[selection].clone());
    }
    let requested_input = args.input.clone().ok_or_else(|| anyhow!("no input selected"))?;
    let input_path = resolve_input(&requested_input)?;
    let output_path = resolve_output(&input_path, args.out.as_deref());

    // --- Preset and prompts ---
    let cfg = load_config()?;
    let converter = AsciiVideoConverter::with_config(cfg.clone());

    let active_preset_name = if args.small {
        "small"
    } else if args.large {
        "large"
    } else {
        cfg.default_preset.as_str()
    };
    let mut options = converter
        .options_from_preset(active_preset_name)
        .with_context(|| format!("loading preset '{}'", active_preset_name))?;

    if is_interactive {
        if args.width.is_none() {
            args.width = Some(
                Input::<String>::new()
                    .with_prompt("ASCII width")
                    .default(options.columns.to_string())
                    .allow_empty(true)
                    .interact_text()?,
            );
        }
        if args.mode.is_none() {
            let default = match options.color_mode {
                ColorMode::AccentOnly => "1",
                ColorMode::TrueColor => "2",
            };
            let answer = Input::<String>::new()
                .with_prompt("Color mode (1 = green only, 2 = full RGB)")
                .default(default.to_string())
                .allow_empty(true)
                .interact_text()?;
            args.mode = Some(ColorMode::from_prompt(&answer));
        }
    }

    if let Some(width) = &args.width {
        options.columns = parse_width(width);
    }
    if let Some(mode) = args.mode {
        options.color_mode = mode;
    }
    if let Some(aspect) = args.cell_aspect {
        options.cell_aspect = aspect;
    }
    if let Some(font) = args.font.clone() {
        options.font = Some(font);
    }
    if let Some(size) = args.font_size {
        options.font_size = size;
    }
    options.keep_audio = !args.no_audio;

    run_conversion(&converter, &input_path, &output_path, &options)
}

fn run_conversion(converter: &AsciiVideoConverter, input: &std::path::Path, output: &std::path::Path, options: &ConversionOptions) -> Result<()> {
    println!("Converting {} -> {}", input.display(), output.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| anyhow!("progress template: {}", e))?,
    );
    pb.set_message("Converting frames");

    let result = converter.convert_video(input, output, options, |progress: &Progress| {
        pb.println(&progress.message);
        pb.set_message(progress.message.clone());
        pb.tick();
    });

    match result {
        Ok(report) => {
            pb.finish_with_message(format!("Frames: {}", report.frames));
            let audio = if report.with_audio { "with audio" } else { "without audio" };
            println!("Done! ASCII video saved to: {} ({})", report.output.display(), audio);
            Ok(())
        }
        Err(err @ ConversionError::Remux { .. }) => {
            pb.abandon_with_message("Audio remux failed");
            Err(err).context("video rendered without audio")
        }
        Err(err) => {
            pb.abandon_with_message("Conversion failed");
            if err.leaves_partial_output() {
                eprintln!("Warning: partial output may remain next to {}", output.display());
            }
            Err(err.into())
        }
    }
}
