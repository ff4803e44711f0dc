//! Cuts the allergen sprite sheet into one transparent PNG per icon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use menu_agent_svc::icons::{DEFAULT_OUTPUT_DIR, Method, extract_icons};
use tracing::info;

/// Extract allergen icons from a 4x4 sprite sheet
#[derive(Parser, Debug)]
#[command(name = "extract-icons")]
#[command(about = "Extract allergen icons from a 4x4 sprite sheet of round icons")]
#[command(version)]
struct Args {
    /// Path to the sprite sheet image
    image_path: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Circle detection method
    #[arg(short, long, value_enum, default_value_t = Method::Smart)]
    method: Method,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let icons = extract_icons(&args.image_path, &args.output, args.method)?;
    info!(
        "Extracted {} icons into {}",
        icons.len(),
        args.output.display()
    );
    Ok(())
}
