//! camera-planner binary
//!
//! Command-line front end over the planner core. Every command reads JSON
//! from files and writes JSON to stdout.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                                  | Default   | Description                      |
//! |--------------------------------------|-----------|----------------------------------|
//! | `PLANNER__ENGINE__PROVIDER`          | `orbit`   | Backend adapter id               |
//! | `PLANNER__ENGINE__MODEL`             | `gpt-4o-mini` | Model passed to the backend  |
//! | `PLANNER__ENGINE__ENDPOINT`          | *(none)*  | Chat completion URL (`openai`)   |
//! | `PLANNER__ENGINE__API_KEY`           | *(none)*  | Bearer token (`openai`)          |
//! | `PLANNER__ENGINE__REQUEST_TIMEOUT_SECS` | `30`   | Per-request backend timeout      |
//! | `PLANNER__ANALYZER__MIN_DISTANCE_FACTOR` | `1.5` | Safe distance lower multiplier   |
//! | `PLANNER__ANALYZER__MAX_DISTANCE_FACTOR` | `5.0` | Safe distance upper multiplier   |

use anyhow::{Context, Result};
use camera_planner::{
    composer::{allocate_durations, PatternArgs, PatternRegistry},
    engine::PathEngine,
    protocol::{CameraPath, CompiledPrompt, Envelope},
    scene::{SceneAnalyzer, SceneSnapshot},
    settings::Settings,
    types::SceneGeometry,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "camera-planner", about = "Camera path planner", version)]
struct Args {
    /// TOML settings file
    #[arg(long, env = "PLANNER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the safety envelope of a scene snapshot
    Analyze {
        scene: PathBuf,
        /// Also print fallback orbit keyframes for this instruction
        #[arg(long)]
        instruction: Option<String>,
    },
    /// Expand a motion pattern into primitives
    Compose {
        pattern: PathBuf,
        #[arg(long)]
        scene: Option<PathBuf>,
        /// Allocate this many seconds across the primitives
        #[arg(long)]
        duration: Option<f32>,
    },
    /// Generate a camera path from a compiled prompt
    Plan {
        prompt: PathBuf,
        /// Override the configured provider
        #[arg(long)]
        provider: Option<String>,
        /// Attach this scene's geometry to the prompt
        #[arg(long)]
        scene: Option<PathBuf>,
    },
    /// Check a camera path against its constraints
    Check {
        path: PathBuf,
        #[arg(long)]
        scene: Option<PathBuf>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_geometry(analyzer: &SceneAnalyzer, path: Option<&Path>) -> Result<Option<SceneGeometry>> {
    path.map(|p| read_json::<SceneSnapshot>(p).map(|s| analyzer.analyze(&s)))
        .transpose()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camera_planner=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let analyzer = SceneAnalyzer::new(settings.analyzer.clone());

    match args.command {
        Command::Analyze { scene, instruction } => {
            let snapshot: SceneSnapshot = read_json(&scene)?;
            let geometry = analyzer.analyze(&snapshot);
            match instruction {
                Some(text) => {
                    let keyframes = analyzer.generate_safe_keyframes(&geometry, &text);
                    print_json(&serde_json::json!({
                        "geometry": geometry,
                        "keyframes": keyframes,
                    }))
                }
                None => print_json(&geometry),
            }
        }

        Command::Compose {
            pattern,
            scene,
            duration,
        } => {
            let args: PatternArgs = read_json(&pattern)?;
            let geometry = load_geometry(&analyzer, scene.as_deref())?
                .unwrap_or_else(|| analyzer.analyze(&SceneSnapshot::default()));
            let primitives =
                PatternRegistry::with_builtins().try_compose(&args, &geometry.scene_meta())?;
            match duration {
                Some(total) => print_json(&serde_json::json!({
                    "primitives": primitives,
                    "durations": allocate_durations(&primitives, total),
                })),
                None => print_json(&primitives),
            }
        }

        Command::Plan {
            prompt,
            provider,
            scene,
        } => {
            let mut prompt: CompiledPrompt = read_json(&prompt)?;
            if let Some(geometry) = load_geometry(&analyzer, scene.as_deref())? {
                prompt.scene = Some(geometry);
            }

            let mut config = settings.engine.clone();
            if let Some(id) = provider {
                config.provider = id;
            }

            let engine = PathEngine::new();
            engine.initialize(config);

            let envelope = Envelope::from(engine.generate_path(&prompt).await);
            print_json(&envelope)?;
            if let Some(error) = &envelope.error {
                anyhow::bail!("{}: {}", error.code, error.message);
            }
            Ok(())
        }

        Command::Check { path, scene } => {
            let camera_path: CameraPath = read_json(&path)?;
            let geometry = load_geometry(&analyzer, scene.as_deref())?;
            let report = camera_planner::engine::validate_path(&camera_path, geometry.as_ref());
            print_json(&report)?;
            if !report.is_valid() {
                anyhow::bail!("{} constraint violation(s)", report.violations.len());
            }
            Ok(())
        }
    }
}
