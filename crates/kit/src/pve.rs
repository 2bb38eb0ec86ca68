//! Thin wrappers over the Proxmox VE node management CLIs.
//!
//! All hypervisor state is owned by Proxmox itself; this module only builds
//! `qm`/`pvesh` invocations, runs them, and parses their output.

use std::process::Command;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::command_run::CommandRun;

/// Node directory scanned by Proxmox storage for ISO images.
pub const ISO_DIR: &str = "/var/lib/vz/template/iso";

/// Node directory scanned by Proxmox storage for cloud-init snippets.
pub const SNIPPETS_DIR: &str = "/var/lib/vz/snippets";

/// Run a qm command and handle errors consistently
pub(crate) fn run_qm(args: &[String], err_msg: &str) -> Result<()> {
    Command::new("qm")
        .args(args)
        .run()
        .with_context(|| err_msg.to_string())
}

/// Single guest entry from the `pvesh` cluster resources listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct VmResource {
    /// Numeric guest identifier, unique per cluster
    pub vmid: u32,

    /// Display name, absent for half-created guests
    pub name: Option<String>,

    /// Node the guest is defined on
    pub node: String,

    /// Guest status (running, stopped)
    pub status: String,

    /// Set to 1 for templates
    #[serde(default)]
    pub template: u8,

    /// Configured memory in bytes
    #[serde(default)]
    pub maxmem: u64,

    /// Configured disk size in bytes
    #[serde(default)]
    pub maxdisk: u64,
}

/// List all guests known to the cluster.
pub fn list_vm_resources() -> Result<Vec<VmResource>> {
    Command::new("pvesh")
        .args([
            "get",
            "/cluster/resources",
            "--type",
            "vm",
            "--output-format",
            "json",
        ])
        .run_and_parse_json()
        .context("Failed to query cluster resources via pvesh")
}

/// List templates defined on the cluster, ordered by vmid.
pub fn list_templates() -> Result<Vec<VmResource>> {
    let mut guests = list_vm_resources()?;
    guests.retain(|g| g.template == 1);
    guests.sort_by_key(|g| g.vmid);
    Ok(guests)
}
