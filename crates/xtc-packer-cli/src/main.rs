use std::cmp::Ordering;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use image::RgbaImage;
use tracing::{error, info, warn};
use walkdir::WalkDir;
use xtc_packer_core::config::{
    ConversionOptions, Device, DitherAlgorithm, ImageMode, Orientation, SourceType, SplitMode,
};
use xtc_packer_core::{
    convert_frames, convert_frames_streamed, parse_container, BookMetadata, CancelToken, XtcError,
};

#[derive(Parser, Debug)]
#[command(
    name = "xtc-packer",
    about = "Convert images and comic page sequences into XTC/XTCH containers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --no-progress or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an image or a directory of pages into a container
    Convert(ConvertArgs),
    /// Parse a container and print its header, metadata and index
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone)]
struct ConvertArgs {
    // Input/Output
    /// Input image file or directory of pages (natural filename order)
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output file path (defaults to the input name with .xtc/.xtch)
    #[arg(short, long, help_heading = "Input/Output")]
    output: Option<PathBuf>,
    /// Source kind: cbz | pdf | image | video (inferred from the input
    /// when omitted; picks the orientation default)
    #[arg(long, help_heading = "Input/Output")]
    source_type: Option<String>,
    /// Book metadata JSON file (title, author, toc, ...)
    #[arg(long, help_heading = "Input/Output")]
    metadata: Option<PathBuf>,

    // Device/Format
    /// Target device: x4 (480x800) | x3 (528x792)
    #[arg(long, default_value = "x4", help_heading = "Device/Format")]
    device: String,
    /// Produce a 2-bit XTCH container instead of 1-bit XTC
    #[arg(long = "2bit", default_value_t = false, help_heading = "Device/Format")]
    two_bit: bool,
    /// Emit header and index before page data
    #[arg(long, default_value_t = false, help_heading = "Device/Format")]
    streamed: bool,

    // Image Processing
    /// Dither algorithm: floyd | atkinson | stucki | zhoufang |
    /// ostromoukhov | sierra-lite | ordered | stochastic | none
    #[arg(long, default_value = "stucki", help_heading = "Image Processing")]
    dither: String,
    /// Histogram-stretch intensity: 0 | 2 | 4 | 6 | 8
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    contrast: u8,
    /// Gamma correction (clamped to 0.1..=3.0)
    #[arg(long, default_value_t = 1.0, help_heading = "Image Processing")]
    gamma: f32,
    /// Invert prior to grayscale
    #[arg(long, default_value_t = false, help_heading = "Image Processing")]
    invert: bool,
    /// Pad with black instead of white
    #[arg(long, default_value_t = false, help_heading = "Image Processing")]
    pad_black: bool,
    /// Horizontal crop margin percent (0..=20)
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    horizontal_margin: u8,
    /// Vertical crop margin percent (0..=20)
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    vertical_margin: u8,

    // Layout
    /// Page orientation: portrait | landscape (default follows source type)
    #[arg(long, help_heading = "Layout")]
    orientation: Option<String>,
    /// Landscape split behaviour: overlap | split | nosplit
    #[arg(long, default_value = "overlap", help_heading = "Layout")]
    split: String,
    /// Treat the source as an infinite vertical strip
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    manhwa: bool,
    /// Manhwa slice overlap percent: 30 | 50 | 75
    #[arg(long, default_value_t = 50, help_heading = "Layout")]
    overlap: u8,
    /// Emit a rotated overview page per frame
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    sideways: bool,
    /// Emit a letterboxed overview page per frame
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    include_overviews: bool,
    /// Single-image scaling: cover | letterbox | fill | crop
    #[arg(long, default_value = "letterbox", help_heading = "Layout")]
    image_mode: String,
    /// Video sampling rate (frames per second)
    #[arg(long, default_value_t = 1.0, help_heading = "Layout")]
    fps: f32,

    /// Print the merged configuration as JSON and exit
    #[arg(long, default_value_t = false, help_heading = "Debug")]
    print_config: bool,
}

#[derive(Parser, Debug, Clone)]
struct InspectArgs {
    /// Container file to inspect
    input: PathBuf,
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Decode this page (0-indexed) and write it next to the container
    #[arg(long)]
    extract_page: Option<usize>,
    /// Output path for --extract-page (defaults to page-N.png)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    let result = match &cli.command {
        Commands::Convert(args) => run_convert(args, cli.progress && !cli.quiet),
        Commands::Inspect(args) => run_inspect(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<XtcError>() {
        Some(XtcError::InvalidOption(_)) => 2,
        Some(XtcError::FrameDecodeFailure { .. }) => 3,
        Some(XtcError::MalformedContainer(_)) | Some(XtcError::MalformedChunk(_)) => 4,
        Some(XtcError::Cancelled) => 5,
        _ => 1,
    }
}

fn run_convert(args: &ConvertArgs, show_progress: bool) -> anyhow::Result<()> {
    let source_type = resolve_source_type(args)?;
    let opts = build_options(args, source_type)?;
    opts.validate()?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&opts)?);
        return Ok(());
    }

    let paths = gather_pages(&args.input)?;
    if paths.is_empty() {
        return Err(XtcError::FrameDecodeFailure {
            index: 0,
            reason: format!("no image files under {}", args.input.display()),
        }
        .into());
    }
    let frames = load_frames(&paths, show_progress)?;
    info!(count = frames.len(), "loaded source frames");

    let metadata = match &args.metadata {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read metadata {}", path.display()))?;
            let meta: BookMetadata = serde_json::from_str(&text)
                .with_context(|| format!("parse metadata {}", path.display()))?;
            Some(meta)
        }
        None => None,
    };

    let output = output_path(args, &opts);
    let cancel = CancelToken::new();

    if opts.streamed {
        let file = fs::File::create(&output)
            .with_context(|| format!("create {}", output.display()))?;
        let result = convert_frames_streamed(
            &frames,
            &opts,
            metadata.as_ref(),
            &cancel,
            BufWriter::new(file),
        );
        match result {
            Ok((summary, _writer)) => {
                info!(pages = summary.page_count, path = %output.display(), "container streamed");
            }
            Err(err) => {
                // A partially streamed file is invalid output.
                let _ = fs::remove_file(&output);
                return Err(err.into());
            }
        }
    } else {
        let out = convert_frames(&frames, &opts, metadata.as_ref(), &cancel)?;
        fs::write(&output, &out.bytes)
            .with_context(|| format!("write {}", output.display()))?;
        info!(
            pages = out.page_count,
            bytes = out.bytes.len(),
            path = %output.display(),
            "container written"
        );
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("read {}", args.input.display()))?;
    let container = parse_container(&bytes)?;

    if let Some(page) = args.extract_page {
        let img = container.decode_page(&bytes, page)?;
        let out = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("page-{page}.png")));
        img.save(&out).with_context(|| format!("write {}", out.display()))?;
        info!(page, path = %out.display(), "page extracted");
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspect_report(&container))?);
    } else {
        println!(
            "{} v{}, {} pages, {}",
            if container.two_bit { "XTCH" } else { "XTC" },
            container.version,
            container.page_count,
            if container.metadata.is_some() {
                "with metadata"
            } else {
                "no metadata"
            }
        );
        if let Some(meta) = &container.metadata {
            println!("  title: {}", meta.title);
            if !meta.author.is_empty() {
                println!("  author: {}", meta.author);
            }
            for entry in &meta.toc {
                println!(
                    "  chapter: {} ({}..={})",
                    entry.title, entry.start_page, entry.end_page
                );
            }
        }
        for (i, entry) in container.index.iter().enumerate() {
            println!(
                "  page {i}: offset {} size {} ({}x{})",
                entry.offset, entry.size, entry.width, entry.height
            );
        }
    }
    Ok(())
}

fn inspect_report(container: &xtc_packer_core::Container) -> serde_json::Value {
    serde_json::json!({
        "format": if container.two_bit { "XTCH" } else { "XTC" },
        "version": container.version,
        "pageCount": container.page_count,
        "metadata": container.metadata,
        "index": container
            .index
            .iter()
            .map(|e| serde_json::json!({
                "offset": e.offset,
                "size": e.size,
                "width": e.width,
                "height": e.height,
            }))
            .collect::<Vec<_>>(),
    })
}

fn resolve_source_type(args: &ConvertArgs) -> anyhow::Result<SourceType> {
    if let Some(s) = &args.source_type {
        return SourceType::from_str(s)
            .map_err(|_| XtcError::InvalidOption(format!("unknown source type '{s}'")).into());
    }
    Ok(if args.input.is_dir() {
        SourceType::Cbz
    } else {
        SourceType::Image
    })
}

fn build_options(args: &ConvertArgs, source_type: SourceType) -> anyhow::Result<ConversionOptions> {
    let orientation = match &args.orientation {
        Some(s) => Orientation::from_str(s)
            .map_err(|_| XtcError::InvalidOption(format!("unknown orientation '{s}'")))?,
        None => source_type.default_orientation(),
    };
    Ok(ConversionOptions {
        device: parse_option::<Device>(&args.device, "device")?,
        source_type,
        two_bit: args.two_bit,
        dither: parse_option::<DitherAlgorithm>(&args.dither, "dither algorithm")?,
        contrast: args.contrast,
        gamma: args.gamma,
        invert: args.invert,
        pad_black: args.pad_black,
        orientation,
        split_mode: parse_option::<SplitMode>(&args.split, "split mode")?,
        include_overviews: args.include_overviews,
        sideways_overviews: args.sideways,
        manhwa: args.manhwa,
        manhwa_overlap_percent: args.overlap,
        image_mode: parse_option::<ImageMode>(&args.image_mode, "image mode")?,
        video_fps: args.fps,
        horizontal_margin_percent: args.horizontal_margin,
        vertical_margin_percent: args.vertical_margin,
        streamed: args.streamed,
    })
}

fn parse_option<T: FromStr>(value: &str, what: &str) -> Result<T, XtcError> {
    T::from_str(value)
        .map_err(|_| XtcError::InvalidOption(format!("unknown {what} '{value}'")))
}

fn output_path(args: &ConvertArgs, opts: &ConversionOptions) -> PathBuf {
    if let Some(out) = &args.output {
        return out.clone();
    }
    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    PathBuf::from(format!(
        "{stem}.{}",
        if opts.two_bit { "xtch" } else { "xtc" }
    ))
}

/// Collect page image paths. Directories are scanned recursively and
/// sorted in natural filename order ("page2" before "page10"), the order
/// comic archives are read in.
fn gather_pages(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        list.push(path.to_path_buf());
    } else {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_image(p) {
                list.push(p.to_path_buf());
            }
        }
        list.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    }
    Ok(list)
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff")
    )
}

/// Compare paths with digit runs ordered numerically.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().peekable();
    let mut cb = b.chars().peekable();
    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let na = take_number(&mut ca);
                    let nb = take_number(&mut cb);
                    match na.cmp(&nb) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    let xa = x.to_ascii_lowercase();
                    let yb = y.to_ascii_lowercase();
                    match xa.cmp(&yb) {
                        Ordering::Equal => {
                            ca.next();
                            cb.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> u64 {
    let mut value = 0u64;
    while let Some(c) = chars.peek().copied() {
        if let Some(d) = c.to_digit(10) {
            value = value.saturating_mul(10).saturating_add(d as u64);
            chars.next();
        } else {
            break;
        }
    }
    value
}

fn load_frames(paths: &[PathBuf], progress: bool) -> anyhow::Result<Vec<RgbaImage>> {
    use indicatif::{ProgressBar, ProgressStyle};
    let bar = if progress {
        let b = ProgressBar::new(paths.len() as u64);
        b.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} loading {pos}/{len} [{elapsed_precise}] {wide_msg}",
            )
            .unwrap(),
        );
        Some(b)
    } else {
        None
    };
    let mut frames = Vec::with_capacity(paths.len());
    for (index, p) in paths.iter().enumerate() {
        let msg = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if let Some(b) = &bar {
            b.set_message(msg.to_string());
        }
        match image::open(p) {
            Ok(img) => frames.push(img.to_rgba8()),
            Err(e) => {
                if paths.len() > 1 {
                    warn!(path = %p.display(), error = %e, "skipping undecodable page");
                } else {
                    if let Some(b) = &bar {
                        b.finish_and_clear();
                    }
                    return Err(XtcError::FrameDecodeFailure {
                        index,
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    if frames.is_empty() {
        return Err(XtcError::FrameDecodeFailure {
            index: 0,
            reason: "no page could be decoded".into(),
        }
        .into());
    }
    Ok(frames)
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_sorts_digit_runs_numerically() {
        let mut names = vec!["page10.png", "page2.png", "page1.png", "cover.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["cover.png", "page1.png", "page2.png", "page10.png"]);
    }

    #[test]
    fn natural_order_is_case_insensitive() {
        assert_eq!(natural_cmp("Page3.png", "page03.png"), Ordering::Equal);
        assert_eq!(natural_cmp("a2", "A10"), Ordering::Less);
    }

    #[test]
    fn exit_codes_follow_error_taxonomy() {
        let invalid: anyhow::Error = XtcError::InvalidOption("contrast".into()).into();
        assert_eq!(exit_code_for(&invalid), 2);
        let malformed: anyhow::Error = XtcError::MalformedContainer("magic".into()).into();
        assert_eq!(exit_code_for(&malformed), 4);
        let cancelled: anyhow::Error = XtcError::Cancelled.into();
        assert_eq!(exit_code_for(&cancelled), 5);
        let io: anyhow::Error =
            XtcError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).into();
        assert_eq!(exit_code_for(&io), 1);
    }
}
