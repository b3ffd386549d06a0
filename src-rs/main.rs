mod batch;
mod canvas;
mod composite;
mod config;
mod coords;
mod draw;
mod error;
mod gateway;
mod media;
mod post;
mod preview;
mod session;
mod tools;
mod util;

use anyhow::{bail, Context, Result};
use batch::{export_archive, export_directory, status_report, BatchJob};
use canvas::{CanvasState, CommandOutcome, GestureScript, Placement, PlacementCanvas, GESTURES_HELP};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use composite::{render_composite, CompositeLayout};
use config::{log_filter, GatewayArgs, GatewayConfig};
use coords::ContainerRect;
use image::DynamicImage;
use media::{extension_for_mime, PortraitThumbnail, SourceImage};
use post::{apply_watermark, Resolution, WatermarkColor, WatermarkPosition, WatermarkSettings};
use serde_json::{json, Value};
use session::Session;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tools::{generate_edit_prompt, tool_catalog, Tool};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use util::{
    abs_path, default_sidecar_for, load_json_arg, load_json_input, out_root, round_to, slugify,
    timestamp_compact, write_bytes, write_json_pretty,
};

#[derive(Parser, Debug)]
#[command(
    name = "photofix",
    version,
    about = "Photo restoration / face-swap CLI backed by a generative image API"
)]
struct Cli {
    /// -v for info logs, -vv for debug (stderr). PHOTOFIX_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print the tool catalog with default settings in JSON
    Tools,
    /// Print the instruction generated for a tool + settings
    Prompt(PromptArgs),
    /// Replay a gesture script on the placement canvas and save placements
    Place(PlaceArgs),
    /// Render the face-swap composite (photo + numbered portrait strip)
    Composite(CompositeArgs),
    /// Run a tool over one or more images through the edit gateway
    Edit(EditArgs),
    /// Burn a text watermark into an image locally
    Watermark(WatermarkArgs),
}

#[derive(Args, Debug)]
struct PromptArgs {
    /// Tool id (see `photofix tools`)
    #[arg(long)]
    tool: String,
    /// Settings JSON: inline object, file path, or - for stdin
    #[arg(long)]
    settings: Option<String>,
}

#[derive(Args, Debug)]
struct PlaceArgs {
    /// Base image the placements are positioned on
    image: Option<PathBuf>,
    /// Portrait as id=path (id defaults to the file stem); repeatable
    #[arg(long = "portrait")]
    portraits: Vec<String>,
    /// Gesture script JSON file (or - for stdin)
    #[arg(long)]
    gestures: Option<String>,
    /// Start from an existing placements JSON instead of an empty canvas
    #[arg(long)]
    placements: Option<String>,
    /// Placements JSON output (default: <out-root>/placements-<ts>.json)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Render the canvas as PNG
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Displayed width of the image in pointer space (default: image width)
    #[arg(long)]
    view_width: Option<f64>,
    /// Displayed height of the image in pointer space (default: keeps aspect)
    #[arg(long)]
    view_height: Option<f64>,
    /// Print a summary JSON instead of the output path
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Print the gesture script schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    gestures_help: bool,
}

#[derive(Args, Debug)]
struct CompositeArgs {
    /// Base photo
    image: PathBuf,
    /// Output JPEG path
    #[arg(long)]
    out: PathBuf,
    /// Portrait as id=path; repeatable
    #[arg(long = "portrait")]
    portraits: Vec<String>,
    /// Placements JSON file (or - for stdin)
    #[arg(long)]
    placements: String,
    #[arg(long, default_value = "restore")]
    tool: String,
    #[arg(long)]
    settings: Option<String>,
    #[arg(long, default_value_t = 50)]
    margin: u32,
    #[arg(long, default_value_t = 200)]
    strip_height: u32,
    /// Marker/prompt sidecar path (default: <out>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ChainOp {
    #[value(name = "upscale-4k")]
    Upscale4k,
    #[value(name = "upscale-8k")]
    Upscale8k,
    #[value(name = "upscale-16k")]
    Upscale16k,
    Animate,
    Watermark,
}

impl ChainOp {
    fn name(self) -> &'static str {
        match self {
            ChainOp::Upscale4k => "upscale-4k",
            ChainOp::Upscale8k => "upscale-8k",
            ChainOp::Upscale16k => "upscale-16k",
            ChainOp::Animate => "animate",
            ChainOp::Watermark => "watermark",
        }
    }
}

#[derive(Args, Debug)]
struct EditArgs {
    /// Input images; two or more run in batch mode
    #[arg(required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    tool: String,
    #[arg(long)]
    settings: Option<String>,
    /// Portrait as id=path; repeatable (restore tool, single image)
    #[arg(long = "portrait")]
    portraits: Vec<String>,
    /// Placements JSON from `place`
    #[arg(long)]
    placements: Option<String>,
    /// Post operation on the single result, in order; repeatable
    #[arg(long = "chain", value_enum)]
    chain: Vec<ChainOp>,
    /// Watermark settings JSON used by --chain watermark
    #[arg(long)]
    watermark: Option<String>,
    /// Output directory (default: <out-root>/<ts>-<tool>)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Also write a zip of every successful result
    #[arg(long)]
    archive: Option<PathBuf>,
    /// Composite margin for the face-swap path
    #[arg(long, default_value_t = 50)]
    margin: u32,
    /// Portrait strip height for the face-swap path
    #[arg(long, default_value_t = 200)]
    strip_height: u32,
    #[command(flatten)]
    gateway: GatewayArgs,
    /// Print the run report JSON instead of the output directory
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct WatermarkArgs {
    input: PathBuf,
    output: PathBuf,
    /// Watermark settings JSON (inline, file, or -)
    #[arg(long)]
    settings: Option<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    position: Option<String>,
    /// 0-100
    #[arg(long)]
    opacity: Option<u8>,
    /// Glyph height in percent of image width
    #[arg(long)]
    font_size: Option<f64>,
    /// white or black
    #[arg(long)]
    color: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Tools => print_json(&tool_catalog()),
        Commands::Prompt(args) => command_prompt(args),
        Commands::Place(args) => command_place(args),
        Commands::Composite(args) => command_composite(args),
        Commands::Edit(args) => command_edit(args),
        Commands::Watermark(args) => command_watermark(args),
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_new(log_filter(verbose)).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({"name": "tools", "description": "List tools with their default settings."}),
        json!({"name": "prompt", "description": "Show the instruction a tool + settings produce."}),
        json!({"name": "place", "description": "Replay placement gestures; write placements JSON and an optional preview."}),
        json!({"name": "composite", "description": "Render the numbered face-swap composite and its marker sidecar."}),
        json!({"name": "edit", "description": "Run a tool through the edit gateway, single or batch, with chained post operations."}),
        json!({"name": "watermark", "description": "Burn a text watermark into an image."}),
    ];
    print_json(&json!({ "commands": rows }))
}

fn load_settings(tool: Tool, arg: Option<&str>) -> Result<tools::ToolSettings> {
    match arg {
        Some(raw) => {
            let value: Value = load_json_arg(raw, "settings")?;
            tool.settings_from_json(value)
        }
        None => Ok(tool.default_settings()),
    }
}

fn command_prompt(args: PromptArgs) -> Result<()> {
    let tool = Tool::parse(&args.tool)?;
    let settings = load_settings(tool, args.settings.as_deref())?;
    println!("{}", generate_edit_prompt(&settings));
    Ok(())
}

/// `id=path`, or a bare path whose stem becomes the id.
fn parse_portrait_arg(raw: &str) -> Result<(String, PathBuf)> {
    if let Some((id, path)) = raw.split_once('=') {
        if id.trim().is_empty() || path.trim().is_empty() {
            bail!("portrait must be id=path, got {raw}");
        }
        return Ok((id.trim().to_string(), PathBuf::from(path.trim())));
    }
    let path = PathBuf::from(raw);
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(ToString::to_string)
        .with_context(|| format!("cannot derive portrait id from {raw}"))?;
    Ok((id, path))
}

fn load_portraits(raw: &[String]) -> Result<Vec<PortraitThumbnail>> {
    let mut out: Vec<PortraitThumbnail> = Vec::new();
    for item in raw {
        let (id, path) = parse_portrait_arg(item)?;
        if out.iter().any(|p| p.id == id) {
            bail!("duplicate portrait id: {id}");
        }
        out.push(PortraitThumbnail::load(id, &path)?);
    }
    Ok(out)
}

/// A bare list, or `{"placements": [...]}` as written by `place`.
fn load_placements(arg: &str) -> Result<Vec<Placement>> {
    let value: Value = load_json_arg(arg, "placements")?;
    let list = match value {
        Value::Object(mut obj) => obj.remove("placements").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(list).context("placements must be a list of placement objects")
}

fn command_place(args: PlaceArgs) -> Result<()> {
    if args.gestures_help {
        println!("{}", GESTURES_HELP.trim());
        return Ok(());
    }
    let Some(image_path) = args.image.as_ref() else {
        bail!("place needs an image (or --gestures-help)");
    };
    let gestures_arg = args.gestures.as_deref().context("--gestures is required")?;
    let source = SourceImage::load(image_path)?;
    let portraits = load_portraits(&args.portraits)?;
    let script_value: Value = load_json_input(gestures_arg, "gestures")?;
    let script = GestureScript::from_value(script_value).context("invalid gesture script")?;

    let (img_w, img_h) = source.dimensions()?;
    let container = match script.container {
        Some(rect) => rect,
        None => {
            let w = args.view_width.unwrap_or(f64::from(img_w));
            let h = args
                .view_height
                .unwrap_or_else(|| w * f64::from(img_h) / f64::from(img_w.max(1)));
            ContainerRect::sized(w, h)
        }
    };

    let initial = match args.placements.as_deref() {
        Some(arg) => load_placements(arg)?,
        None => Vec::new(),
    };
    let mut canvas = PlacementCanvas::new(container, portraits.iter().map(|p| p.id.clone()))
        .with_placements(initial);
    let mut ignored = Vec::new();
    for (idx, command) in script.commands.iter().enumerate() {
        if canvas.apply(command) == CommandOutcome::Ignored {
            warn!(step = idx, ?command, "gesture ignored");
            ignored.push(idx);
        }
    }

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| out_root().join(format!("placements-{}.json", timestamp_compact())));
    let summary = json!({
        "image": abs_path(image_path).display().to_string(),
        "container": container,
        "selected": canvas.selected_id(),
        "drag_in_progress": matches!(canvas.state(), CanvasState::Dragging { .. }),
        "ignored_steps": ignored,
        "portraits": portraits
            .iter()
            .map(|p| json!({"id": p.id, "mime": p.mime, "bytes": p.bytes().len()}))
            .collect::<Vec<_>>(),
        "placements": canvas.placements(),
        "markers": canvas
            .placements()
            .iter()
            .map(|p| {
                json!({
                    "number": canvas.marker_of(&p.id),
                    "placement_id": p.id,
                    "portrait_id": p.portrait_id,
                })
            })
            .collect::<Vec<_>>(),
    });
    write_json_pretty(&out_path, &summary)?;

    let mut preview_path = Value::Null;
    if let Some(path) = args.preview.as_ref() {
        let img = preview::render_preview(&source, &portraits, &canvas)?;
        util::ensure_parent_dir(path)?;
        img.save(path)
            .with_context(|| format!("failed to save preview: {}", path.display()))?;
        preview_path = json!(abs_path(path).display().to_string());
    }

    if args.json {
        let mut out = summary;
        out["out"] = json!(abs_path(&out_path).display().to_string());
        out["preview"] = preview_path;
        print_json(&out)
    } else {
        println!("{}", abs_path(&out_path).display());
        Ok(())
    }
}

fn command_composite(args: CompositeArgs) -> Result<()> {
    let tool = Tool::parse(&args.tool)?;
    if !tool.supports_face_swap() {
        bail!("tool {} does not support face swap", tool.id());
    }
    let settings = load_settings(tool, args.settings.as_deref())?;
    let source = SourceImage::load(&args.image)?;
    let portraits = load_portraits(&args.portraits)?;
    let placements: Vec<Placement> = load_placements(&args.placements)?
        .into_iter()
        .map(Placement::committed)
        .collect();
    if let Some(orphan) = placements
        .iter()
        .find(|p| !portraits.iter().any(|portrait| portrait.id == p.portrait_id))
    {
        bail!("placement {} references unknown portrait {}", orphan.id, orphan.portrait_id);
    }

    let layout = CompositeLayout {
        margin: args.margin,
        strip_height: args.strip_height,
    };
    let payload = render_composite(
        &source,
        &portraits,
        &placements,
        &generate_edit_prompt(&settings),
        layout,
    )?;
    write_bytes(&args.out, &payload.bytes)?;

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(&args.out));
        let mut meta = payload.summary();
        meta["image"] = json!(abs_path(&args.image).display().to_string());
        meta["layout"] = json!(layout);
        write_json_pretty(&meta_path, &meta)?;
    }
    println!("{}", abs_path(&args.out).display());
    Ok(())
}

fn run_chain_op(session: &mut Session, gateway: &dyn gateway::EditGateway, op: ChainOp) -> Value {
    let outcome = match op {
        ChainOp::Upscale4k => session.upscale_to(gateway, Resolution::K4).map(|_| ()),
        ChainOp::Upscale8k => session.upscale_to(gateway, Resolution::K8).map(|_| ()),
        ChainOp::Upscale16k => session.upscale_to(gateway, Resolution::K16).map(|_| ()),
        ChainOp::Animate => session.animate(gateway).map(|_| ()),
        ChainOp::Watermark => session.watermark().map(|_| ()),
    };
    match outcome {
        Ok(()) => {
            info!(op = op.name(), "chained operation done");
            json!({"op": op.name(), "ok": true})
        }
        Err(err) => {
            warn!(op = op.name(), "chained operation failed: {err}");
            json!({"op": op.name(), "ok": false, "error": err.to_string()})
        }
    }
}

/// A file path, or a `data:` URL passed in place of one.
fn load_source(path: &Path) -> Result<SourceImage> {
    let raw = path.to_string_lossy();
    if raw.starts_with("data:") {
        return Ok(SourceImage::from_data_url("upload.png", &raw)?);
    }
    Ok(SourceImage::load(path)?)
}

fn command_edit(args: EditArgs) -> Result<()> {
    let tool = Tool::parse(&args.tool)?;
    let settings = load_settings(tool, args.settings.as_deref())?;
    let images = args
        .images
        .iter()
        .map(|path| load_source(path))
        .collect::<Result<Vec<_>>>()?;
    let gateway = GatewayConfig::resolve(&args.gateway)?.build()?;

    let mut session = Session::new().with_layout(CompositeLayout {
        margin: args.margin,
        strip_height: args.strip_height,
    });
    session.switch_tool(tool);
    session.set_settings(settings);
    session.upload(images);
    for portrait in load_portraits(&args.portraits)? {
        session.add_portrait(portrait);
    }
    if let Some(arg) = args.placements.as_deref() {
        session.load_placements(load_placements(arg)?)?;
    }
    if let Some(raw) = args.watermark.as_deref() {
        let wm: WatermarkSettings = load_json_arg(raw, "watermark settings")?;
        session.set_watermark(wm);
    }
    if !session.portraits().is_empty() && !session.active_tool().supports_face_swap() {
        warn!(
            tool = session.active_tool().id(),
            portraits = session.portraits().len(),
            "portraits are only used by the restore tool"
        );
    }

    let started = Instant::now();
    let total = session.originals().len();
    session.submit(gateway.as_ref(), |job: &BatchJob| {
        info!(image = %job.name, status = ?job.status(), total, "job update");
    })?;

    let chain: Vec<Value> = args
        .chain
        .iter()
        .map(|op| run_chain_op(&mut session, gateway.as_ref(), *op))
        .collect();

    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        out_root().join(format!("{}-{}", timestamp_compact(), slugify(tool.id())))
    });
    let written = export_directory(session.jobs(), &out_dir)?;
    let mut files: Vec<String> = written
        .iter()
        .map(|p| abs_path(p).display().to_string())
        .collect();
    if let Some(video) = session.video() {
        let path = out_dir.join(format!("animation.{}", extension_for_mime(&video.mime)));
        write_bytes(&path, &video.bytes)?;
        files.push(abs_path(&path).display().to_string());
    }
    let archive = match args.archive.as_ref() {
        Some(path) => {
            export_archive(session.jobs(), path)?;
            json!(abs_path(path).display().to_string())
        }
        None => Value::Null,
    };

    let prompt = session.last_prompt().unwrap_or_default().to_string();
    let mut report = status_report(session.jobs(), session.active_tool().id(), &prompt);
    report["mode"] = session.summary()["mode"].clone();
    report["placements"] = json!(session.canvas().placements());
    report["chain"] = json!(chain);
    report["files"] = json!(files);
    report["archive"] = archive;
    report["elapsed_sec"] = json!(round_to(started.elapsed().as_secs_f64(), 2));
    write_json_pretty(&out_dir.join("report.json"), &report)?;

    for job in session.jobs() {
        if let Some(err) = job.error() {
            warn!(image = %job.name, total, "{err}");
        }
    }

    if args.json {
        print_json(&report)
    } else {
        println!("{}", abs_path(&out_dir).display());
        Ok(())
    }
}

fn parse_position(raw: &str) -> Result<WatermarkPosition> {
    let key = raw.trim().to_ascii_lowercase().replace([' ', '_'], "-");
    serde_json::from_value(json!(key)).with_context(|| {
        format!("unknown watermark position {raw} (top-left, top-right, bottom-left, bottom-right, center)")
    })
}

fn parse_color(raw: &str) -> Result<WatermarkColor> {
    serde_json::from_value(json!(raw.trim().to_ascii_lowercase()))
        .with_context(|| format!("unknown watermark color {raw} (white, black)"))
}

fn command_watermark(args: WatermarkArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }
    let mut settings: WatermarkSettings = match args.settings.as_deref() {
        Some(raw) => load_json_arg(raw, "watermark settings")?,
        None => WatermarkSettings::default(),
    };
    if let Some(text) = args.text {
        settings.text = text;
    }
    if let Some(position) = args.position.as_deref() {
        settings.position = parse_position(position)?;
    }
    if let Some(opacity) = args.opacity {
        settings.opacity = opacity.min(100);
    }
    if let Some(font_size) = args.font_size {
        settings.font_size = font_size;
    }
    if let Some(color) = args.color.as_deref() {
        settings.color = parse_color(color)?;
    }

    let input = image::open(&args.input)
        .with_context(|| format!("failed to open input image: {}", args.input.display()))?;
    let marked = DynamicImage::ImageRgba8(apply_watermark(&input, &settings));
    save_image(&marked, &args.output)?;
    println!("{}", abs_path(&args.output).display());
    Ok(())
}

fn save_image(img: &DynamicImage, path: &Path) -> Result<()> {
    util::ensure_parent_dir(path)?;
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false);
    let result = if is_jpeg {
        DynamicImage::ImageRgb8(img.to_rgb8()).save(path)
    } else {
        img.save(path)
    };
    result.with_context(|| format!("failed to save image: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_args_accept_id_or_bare_path() {
        let (id, path) = parse_portrait_arg("grandpa=faces/g.png").unwrap();
        assert_eq!((id.as_str(), path), ("grandpa", PathBuf::from("faces/g.png")));
        let (id, _) = parse_portrait_arg("faces/aunt_may.jpg").unwrap();
        assert_eq!(id, "aunt_may");
        assert!(parse_portrait_arg("=x.png").is_err());
    }

    #[test]
    fn placements_accept_list_or_place_output() {
        let list = r#"[{"id":"a","portrait_id":"p","x":10,"y":20,"width":15,"height":15}]"#;
        assert_eq!(load_placements(list).unwrap().len(), 1);
        let wrapped = r#"{"container":{"width":10,"height":10},"placements":[]}"#;
        assert!(load_placements(wrapped).unwrap().is_empty());
    }

    #[test]
    fn watermark_flags_parse_loosely() {
        assert_eq!(parse_position("Bottom Left").unwrap(), WatermarkPosition::BottomLeft);
        assert_eq!(parse_position("center").unwrap(), WatermarkPosition::Center);
        assert_eq!(parse_color("Black").unwrap(), WatermarkColor::Black);
        assert!(parse_position("middle").is_err());
    }

    #[test]
    fn cli_parses_chained_edit() {
        let cli = Cli::try_parse_from([
            "photofix",
            "edit",
            "a.png",
            "--tool",
            "restore",
            "--chain",
            "upscale-8k",
            "--chain",
            "watermark",
            "--gateway",
            "command",
            "--gateway-cmd",
            "./fake",
        ])
        .unwrap();
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.chain, vec![ChainOp::Upscale8k, ChainOp::Watermark]);
        assert_eq!(args.gateway.gateway_cmd.as_deref(), Some("./fake"));
    }
}
