//! Docker image management for the sandbox.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::fmt::Write as _;
use tracing::info;

use crate::config::Config;
use crate::sandbox::{qualified_name, ContainerRuntime, DockerRuntime, ImageInfo};

/// Image management actions.
#[derive(Subcommand, Debug)]
pub(crate) enum ImageAction {
    /// Pull the sandbox image from its registry
    Pull {
        /// Image to pull (default: sandbox.image from codebox.toml)
        #[arg(long)]
        image: Option<String>,

        /// Pull even if the image exists locally
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Show whether the sandbox image is present locally
    Status {
        /// Image to check (default: sandbox.image from codebox.toml)
        #[arg(long)]
        image: Option<String>,
    },
}

/// Run an image management command.
pub(crate) async fn run(action: ImageAction, config: &Config) -> Result<()> {
    let runtime = DockerRuntime::connect()
        .await
        .context("Failed to connect to Docker")?;

    match action {
        ImageAction::Pull { image, force } => {
            let image = qualified_name(image.as_deref().unwrap_or(&config.sandbox.image));
            pull_image(&runtime, &image, force).await
        }
        ImageAction::Status { image } => {
            let image = qualified_name(image.as_deref().unwrap_or(&config.sandbox.image));
            let info = runtime
                .inspect_image(&image)
                .await
                .context("Failed to inspect image")?;
            print!("{}", format_status(&image, info.as_ref()));
            Ok(())
        }
    }
}

/// Pulls `image` unless it is already present and `force` is off.
async fn pull_image(runtime: &dyn ContainerRuntime, image: &str, force: bool) -> Result<()> {
    if !force && runtime.inspect_image(image).await?.is_some() {
        info!("Image '{}' found locally, skipping pull", image);
        println!("Image '{image}' already exists locally.");
        println!("Use --force to pull anyway.");
        return Ok(());
    }

    info!("Pulling Docker image: {}", image);
    runtime
        .pull_image(image)
        .await
        .with_context(|| format!("Failed to pull {image}"))?;

    println!("{} Pulled {}", "✓".green().bold(), image.cyan());
    Ok(())
}

fn format_status(image: &str, info: Option<&ImageInfo>) -> String {
    let mut out = String::new();

    let Some(info) = info else {
        let _ = writeln!(out, "Image: {image}");
        let _ = writeln!(out, "Status: {}", "Not found".red());
        let _ = writeln!(out, "\nTo pull the image, run:");
        let _ = writeln!(out, "  {}", "codebox image pull".green());
        return out;
    };

    let _ = writeln!(out, "Image: {image}");
    let _ = writeln!(out, "Status: {}", "Found".green());
    let _ = writeln!(out, "Size: {}", format_size(info.size_bytes));
    if let Some(created) = &info.created {
        let _ = writeln!(out, "Created: {created}");
    }
    if !info.tags.is_empty() {
        let _ = writeln!(out, "Tags: {}", info.tags.join(", "));
    }
    let _ = writeln!(out, "ID: {}", info.id);

    out
}

fn format_size(bytes: u64) -> String {
    // Display only; precision loss is irrelevant at these magnitudes.
    #[allow(clippy::cast_precision_loss)]
    let megabytes = bytes as f64 / 1_048_576.0;
    let gigabytes = megabytes / 1024.0;
    if gigabytes >= 1.0 {
        format!("{gigabytes:.2} GB ({megabytes:.2} MB)")
    } else {
        format!("{megabytes:.2} MB")
    }
}
