mod config;
mod engine;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facewash_core::{ClassifierArch, FaceSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facewash", about = "Detect faces wearing makeup and render them without it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one or more images
    Process {
        /// Input images (PNG or JPEG)
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Output directory (default: $FACEWASH_OUT_DIR or ./facewash-out)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Classifier architecture; repeat to compare several
        #[arg(short, long = "model")]
        models: Vec<String>,
        /// Feed the raw face crops to the models instead of resized copies
        #[arg(long)]
        no_resize: bool,
        /// Print a JSON report instead of captions
        #[arg(long)]
        json: bool,
    },
    /// List classifier architectures and which weights are installed
    Models,
}

#[derive(Serialize)]
struct ImageReport {
    path: PathBuf,
    classifier: ClassifierArch,
    faces: Vec<FaceSummary>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::from_env();

    match cli.command {
        Commands::Process {
            images,
            out_dir,
            models,
            no_resize,
            json,
        } => {
            if let Some(dir) = out_dir {
                config.out_dir = dir;
            }
            if no_resize {
                config.resize_faces = false;
            }
            let archs = models
                .iter()
                .map(|m| m.parse::<ClassifierArch>())
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(first) = archs.first() {
                config.classifier = *first;
            }
            process(&config, &images, &archs, json).await?;
        }
        Commands::Models => {
            let models = config.models();
            println!("model directory: {}", models.root().display());
            for arch in ClassifierArch::ALL {
                let marker = if models.has_classifier(arch) { "installed" } else { "missing" };
                let active = if arch == config.classifier { " (default)" } else { "" };
                println!("  {:<22} {marker}{active}", arch.name());
            }
            println!("  {:<22} {}", "detector", presence(&models.detector_path()));
            println!("  {:<22} {}", "generator", presence(&models.generator_path()));
        }
    }

    Ok(())
}

async fn process(
    config: &config::Config,
    images: &[PathBuf],
    archs: &[ClassifierArch],
    json: bool,
) -> Result<()> {
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("creating {}", config.out_dir.display()))?;

    let engine = engine::spawn_engine(config)?;

    let passes = if archs.is_empty() { vec![config.classifier] } else { archs.to_vec() };
    let tagged = passes.len() > 1;
    let mut reports = Vec::new();

    for arch in passes {
        engine.select_model(arch).await?;
        let tag = tagged.then(|| arch.name());

        for path in images {
            let image = match decode(path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping undecodable image"
                    );
                    eprintln!("{}: {e:#}", path.display());
                    continue;
                }
            };

            let faces = engine.process(image).await?;
            tracing::info!(
                path = %path.display(),
                classifier = %arch,
                faces = faces.len(),
                "image processed"
            );

            if !json {
                println!("{} [{arch}]", path.display());
                println!("Detect {} faces", faces.len());
            }
            for face in &faces {
                let rendered = render::write_face(&config.out_dir, path, tag, face)
                    .with_context(|| {
                        format!("writing face {} of {}", face.index + 1, path.display())
                    })?;
                if !json {
                    println!(
                        "  face {}: {} -> {}",
                        face.index + 1,
                        face.caption(),
                        rendered.compare.display()
                    );
                }
            }

            reports.push(ImageReport {
                path: path.clone(),
                classifier: arch,
                faces: faces.iter().map(|f| f.summary()).collect(),
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

fn decode(path: &Path) -> Result<image::RgbImage> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        "installed"
    } else {
        "missing"
    }
}
