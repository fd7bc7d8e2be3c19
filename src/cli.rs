// ============================================================================
// annotate CLI: headless mask editing by replaying recorded gestures
// ============================================================================
//
// Usage examples:
//   annotate -i photo.jpg --script strokes.json                 (writes photo_mask.png)
//   annotate -i shots/*.jpg --script fill.json --output-dir masks/ --skip-annotated
//   annotate -i photo.jpg --config session.json --labels labels.json -o out.png
//   annotate -i a.png b.png --script s.json --events logs/ --verbose
//
// Each input is loaded into a fresh EditorSession, the gesture script is
// replayed through the same pointer-event path the interactive editor uses,
// and the active layer's mask is written as an 8-bit grayscale PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use egui::{Modifiers, PointerButton, Pos2};
use serde::{Deserialize, Serialize};

use crate::components::tools::{PointerEvent, Tool};
use crate::config::SessionConfig;
use crate::io::{self, IoError};
use crate::session::EditorSession;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// annotate headless label-mask editor.
#[derive(Parser, Debug)]
#[command(
    name = "annotate",
    about = "Headless label-mask editor: replays recorded gestures onto images",
    long_about = "Load images (and their existing <stem>_mask.png masks), replay a JSON\n\
                  gesture script through the editor, and save the edited mask.\n\n\
                  Example:\n  \
                  annotate --input photo.jpg --script strokes.json\n  \
                  annotate -i *.jpg --script fill.json --output-dir masks/ --skip-annotated"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Session configuration (JSON). Defaults apply to missing fields.
    #[arg(short, long, value_name = "SESSION.json")]
    pub config: Option<PathBuf>,

    /// Label configuration (JSON); overrides the labels in --config.
    #[arg(short, long, value_name = "LABELS.json")]
    pub labels: Option<PathBuf>,

    /// Gesture script to replay on each image.
    /// If omitted, masks are only loaded and re-saved.
    #[arg(short, long, value_name = "SCRIPT.json")]
    pub script: Option<PathBuf>,

    /// Output mask path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for masks; `<stem>_mask.png` next to the image otherwise.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write the gesture event log as JSON. A file for one input,
    /// a directory of `<stem>_events.json` files for several.
    #[arg(long, value_name = "PATH")]
    pub events: Option<PathBuf>,

    /// Skip images that already have a mask at the output location.
    #[arg(long)]
    pub skip_annotated: bool,

    /// Echo the session log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Gesture script
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptButton {
    #[default]
    Primary,
    Secondary,
    Middle,
}

impl From<ScriptButton> for PointerButton {
    fn from(b: ScriptButton) -> Self {
        match b {
            ScriptButton::Primary => PointerButton::Primary,
            ScriptButton::Secondary => PointerButton::Secondary,
            ScriptButton::Middle => PointerButton::Middle,
        }
    }
}

/// One recorded step. Pointer coordinates are in screen space of the
/// zoomed view, exactly as the interactive editor receives them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Tool {
        tool: Tool,
    },
    Label {
        label: u8,
    },
    /// Select a label by its configured name.
    LabelName {
        name: String,
    },
    Radius {
        radius: f32,
    },
    Zoom {
        percent: f32,
    },
    Layer {
        index: usize,
    },
    Press {
        x: f32,
        y: f32,
        #[serde(default)]
        button: ScriptButton,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        command: bool,
    },
    Move {
        x: f32,
        y: f32,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        command: bool,
    },
    Release {
        x: f32,
        y: f32,
        #[serde(default)]
        button: ScriptButton,
    },
    Undo,
    Redo,
    Cancel,
    DeleteSelection,
}

fn modifiers(shift: bool, command: bool) -> Modifiers {
    Modifiers {
        shift,
        command,
        ..Modifiers::NONE
    }
}

pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Feed every step to the session. Returns the number of steps that could
/// not be applied (unknown label names, out-of-range layers).
pub fn replay(session: &mut EditorSession, steps: &[ScriptStep]) -> usize {
    let mut skipped = 0;
    for step in steps {
        match step {
            ScriptStep::Tool { tool } => session.set_tool(*tool),
            ScriptStep::Label { label } => session.set_label(*label),
            ScriptStep::LabelName { name } => match session.label_config().label_id(name) {
                Some(id) => session.set_label(id),
                None => {
                    crate::log_warn!("Script: unknown label '{}'", name);
                    skipped += 1;
                }
            },
            ScriptStep::Radius { radius } => {
                session.set_brush_radius(*radius);
            }
            ScriptStep::Zoom { percent } => session.set_zoom_percent(*percent),
            ScriptStep::Layer { index } => {
                if !session.set_active_layer(*index) {
                    crate::log_warn!("Script: no layer {}", index);
                    skipped += 1;
                }
            }
            ScriptStep::Press { x, y, button, shift, command } => session.handle_event(PointerEvent::Pressed {
                pos: Pos2::new(*x, *y),
                button: (*button).into(),
                modifiers: modifiers(*shift, *command),
            }),
            ScriptStep::Move { x, y, shift, command } => session.handle_event(PointerEvent::Moved {
                pos: Pos2::new(*x, *y),
                modifiers: modifiers(*shift, *command),
            }),
            ScriptStep::Release { x, y, button } => session.handle_event(PointerEvent::Released {
                pos: Pos2::new(*x, *y),
                button: (*button).into(),
                modifiers: Modifiers::NONE,
            }),
            ScriptStep::Undo => {
                session.undo();
            }
            ScriptStep::Redo => {
                session.redo();
            }
            ScriptStep::Cancel => session.cancel(),
            ScriptStep::DeleteSelection => {
                session.delete_selection();
            }
        }
    }
    skipped
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let config = match load_config(args.config.as_deref(), args.labels.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let steps = match &args.script {
        Some(path) => match std::fs::read_to_string(path).map_err(IoError::from).and_then(|src| {
            parse_script(&src).map_err(IoError::from)
        }) {
            Ok(steps) => steps,
            Err(e) => {
                eprintln!("error: could not read script '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let output_path = match &args.output {
            Some(p) if !multi => p.clone(),
            _ => io::mask_path_for(input_path, args.output_dir.as_deref()),
        };

        if args.skip_annotated && output_path.exists() {
            if multi || args.verbose {
                println!("  skipped: {} exists", output_path.display());
            }
            continue;
        }

        let events_path = args.events.as_ref().map(|p| {
            if multi {
                let stem = input_path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
                p.join(format!("{}_events.json", stem))
            } else {
                p.clone()
            }
        });

        let file_start = Instant::now();
        match run_one(input_path, &output_path, events_path.as_deref(), &config, &steps) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn load_config(config: Option<&Path>, labels: Option<&Path>) -> Result<SessionConfig, String> {
    let mut cfg = match config {
        Some(path) => io::load_session_config(path).map_err(|e| format!("config '{}': {}", path.display(), e))?,
        None => SessionConfig::default(),
    };
    if let Some(path) = labels {
        cfg.labels = io::load_label_config(path).map_err(|e| format!("labels '{}': {}", path.display(), e))?;
    }
    Ok(cfg)
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    events: Option<&Path>,
    config: &SessionConfig,
    steps: &[ScriptStep],
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let image = io::load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let mut session = EditorSession::new(config.clone());
    let active = session.active_layer_index();

    // A previous run's output wins over the mask stored beside the image.
    let existing = if output.exists() { output.to_path_buf() } else { io::mask_path_for(input, None) };
    let mut masks = vec![None; active + 1];
    if existing.exists() {
        match io::load_mask(&existing) {
            Ok(mask) => masks[active] = Some(mask),
            Err(e) => crate::log_warn!("{}: existing mask ignored: {}", existing.display(), e),
        }
    }
    session.load_image(image, masks);

    // -- Step 2: Replay gestures -----------------------------------------
    let skipped = replay(&mut session, steps);
    if skipped > 0 {
        crate::log_warn!("{}: {} script step(s) skipped", input.display(), skipped);
    }

    // -- Step 3: Save ----------------------------------------------------
    let mask = session.active_mask().ok_or_else(|| "no active layer".to_string())?;
    io::save_mask(mask, output).map_err(|e| format!("save failed: {}", e))?;
    if let Some(path) = events {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| format!("events dir: {}", e))?;
        }
        io::write_events(session.events(), path).map_err(|e| format!("events: {}", e))?;
    }
    crate::log_info!(
        "{}: {} undo step(s), {} event(s) → {}",
        input.display(),
        session.history().undo_count(),
        session.events().len(),
        output.display()
    );
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    // Masks written by earlier runs are not inputs.
                    let is_mask = entry
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s.ends_with(io::MASK_SUFFIX));
                    if !is_mask && !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
