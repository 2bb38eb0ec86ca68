//! pvekit - build Proxmox VE virtual-machine templates from cloud images

use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};

mod command_run;
mod common_opts;
mod pve;
mod templates;
mod to_template;
mod utils;

/// Turn cloud images into Proxmox VE templates.
///
/// pvekit wraps the node-local `qm` and `pvesh` management commands: it
/// creates a VM shell, imports a cloud image as its disk, optionally wires
/// up a VLAN tag and a cloud-init snippet, and converts the result into a
/// template ready for cloning.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available pvekit commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a VM template from a cloud image
    #[clap(name = "to-template")]
    ToTemplate(to_template::ToTemplateOpts),

    /// Inspect VM templates on this node
    #[clap(subcommand)]
    Templates(templates::TemplatesOpts),
}

/// Install and configure the tracing/logging system.
///
/// Sets up structured logging with environment-based filtering,
/// error layer integration, and console output formatting.
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let format = fmt::format().without_time().with_target(false).compact();

    let fmt_layer = fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::ToTemplate(opts) => to_template::run(opts)?,
        Commands::Templates(cmd) => cmd.run()?,
    }
    Ok(())
}
