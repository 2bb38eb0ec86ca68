//! to-template command - build a VM template from a cloud image
//!
//! Sequences the node-local `qm` commands that turn a cloud image into a
//! reusable template: create the VM shell, import the image as its disk,
//! set the boot order, optionally tag the network interface with a VLAN and
//! attach a cloud-init snippet, and convert the result into a template.
//!
//! The sequence is built up front as a plain list of steps so that it can
//! be inspected (`--dry-run`) and tested without a Proxmox node. Execution
//! is strictly sequential; the first failing `qm` invocation aborts the run
//! and partially created VM state is left for the operator to clean up.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::common_opts::MemoryOpts;
use crate::pve;
use crate::utils::{parse_memory_to_mb, resolve_iso_path, validate_snippet};

/// Options for building a VM template from a cloud image
#[derive(Debug, Parser)]
pub struct ToTemplateOpts {
    /// Virtual machine ID for the new template
    #[clap(long)]
    pub vmid: u32,

    /// Virtual machine name (no whitespace)
    #[clap(long)]
    pub name: String,

    /// Path to the cloud image to import as the template disk
    #[clap(long)]
    pub iso: Utf8PathBuf,

    /// Cloud-init user-data snippet, a file name under /var/lib/vz/snippets
    #[clap(long)]
    pub cinit: Option<String>,

    /// VLAN tag for the network interface (1-4094)
    #[clap(long)]
    pub vlan: Option<u16>,

    #[clap(flatten)]
    pub memory: MemoryOpts,

    /// Number of CPU cores
    #[clap(long, default_value_t = 2)]
    pub cores: u32,

    /// Proxmox OS type
    #[clap(long, default_value = "l26")]
    pub ostype: String,

    /// Storage for the imported disk and the cloud-init drive
    #[clap(long, default_value = "local-lvm")]
    pub storage: String,

    /// Network bridge for the first interface
    #[clap(long, default_value = "vmbr0")]
    pub bridge: String,

    /// Print the qm command sequence without executing it
    #[clap(long)]
    pub dry_run: bool,
}

impl Default for ToTemplateOpts {
    fn default() -> Self {
        Self {
            vmid: 0,
            name: String::new(),
            iso: Utf8PathBuf::new(),
            cinit: None,
            vlan: None,
            memory: MemoryOpts::default(),
            cores: 2,
            ostype: "l26".to_string(),
            storage: "local-lvm".to_string(),
            bridge: "vmbr0".to_string(),
            dry_run: false,
        }
    }
}

/// One qm invocation in the template build sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Short description shown on the progress bar and in logs
    pub desc: &'static str,

    /// Arguments passed to qm
    pub args: Vec<String>,
}

impl ToTemplateOpts {
    pub fn resolved_memory_mb(&self) -> Result<u32> {
        parse_memory_to_mb(&self.memory.memory)
    }

    /// Check everything that can fail locally, before any qm command runs.
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(eyre!("VM name cannot be empty"));
        }
        if self.name.contains(char::is_whitespace) {
            return Err(eyre!(
                "VM name '{}' contains whitespace; use a name without spaces",
                self.name
            ));
        }
        if let Some(vlan) = self.vlan {
            if vlan == 0 || vlan > 4094 {
                return Err(eyre!("VLAN tag {} is outside the 802.1Q range 1-4094", vlan));
            }
        }
        if let Some(ref cinit) = self.cinit {
            validate_snippet(cinit)?;
        }
        Ok(())
    }

    /// Build the ordered qm invocations for this request.
    ///
    /// `iso` must already be resolved to an absolute path. The cloud-init
    /// drive and snippet reference are emitted only when a snippet was
    /// requested.
    pub fn plan(&self, iso: &Utf8Path) -> Result<Vec<Step>> {
        let vmid = self.vmid.to_string();
        let memory = self.resolved_memory_mb()?.to_string();

        let mut net0 = format!("virtio,bridge={}", self.bridge);
        if let Some(vlan) = self.vlan {
            net0.push_str(&format!(",tag={vlan}"));
        }

        let mut steps = vec![
            Step {
                desc: "Creating VM",
                args: vec![
                    "create".into(),
                    vmid.clone(),
                    "--name".into(),
                    self.name.clone(),
                    "--ostype".into(),
                    self.ostype.clone(),
                    "--tablet".into(),
                    "0".into(),
                ],
            },
            Step {
                desc: "Configuring network",
                args: vec![
                    "set".into(),
                    vmid.clone(),
                    "--net0".into(),
                    net0,
                    "--memory".into(),
                    memory,
                    "--cores".into(),
                    self.cores.to_string(),
                    "--cpu".into(),
                    "host".into(),
                ],
            },
            Step {
                desc: "Importing disk",
                args: vec![
                    "set".into(),
                    vmid.clone(),
                    "--scsi0".into(),
                    format!("{}:0,import-from={},discard=on,ssd=1", self.storage, iso),
                ],
            },
            Step {
                desc: "Configuring boot",
                args: vec![
                    "set".into(),
                    vmid.clone(),
                    "--boot".into(),
                    "order=scsi0".into(),
                    "--scsihw".into(),
                    "virtio-scsi-single".into(),
                    "--agent".into(),
                    "enabled=1,fstrim_cloned_disks=1".into(),
                ],
            },
        ];

        if let Some(ref cinit) = self.cinit {
            steps.push(Step {
                desc: "Attaching cloud-init drive",
                args: vec![
                    "set".into(),
                    vmid.clone(),
                    "--ide2".into(),
                    format!("{}:cloudinit", self.storage),
                    "--ipconfig0".into(),
                    "ip=dhcp".into(),
                ],
            });
            steps.push(Step {
                desc: "Applying cloud-init snippet",
                args: vec![
                    "set".into(),
                    vmid.clone(),
                    "--cicustom".into(),
                    format!("user=local:snippets/{cinit}"),
                ],
            });
        }

        steps.push(Step {
            desc: "Converting to template",
            args: vec!["template".into(), vmid],
        });

        Ok(steps)
    }
}

/// Build a template according to the given options.
///
/// Validation runs first; no hypervisor command is issued unless every
/// local pre-check passed.
pub fn run(opts: ToTemplateOpts) -> Result<()> {
    opts.validate()?;
    let iso = resolve_iso_path(&opts.iso)?;
    debug!("Using cloud image at {}", iso);

    let steps = opts.plan(&iso)?;

    if opts.dry_run {
        for step in &steps {
            println!("qm {}", step.args.join(" "));
        }
        return Ok(());
    }

    let pb = ProgressBar::new(steps.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{msg:<28} [{bar:40}] {pos}/{len}")?.progress_chars("=> "),
    );

    for step in &steps {
        pb.set_message(step.desc);
        info!("{} for VM ID {}", step.desc, opts.vmid);
        if let Err(e) = pve::run_qm(&step.args, step.desc) {
            pb.abandon();
            return Err(e);
        }
        pb.inc(1);
    }
    pb.finish_with_message("Template created");

    info!(
        "Template creation for VM ID {} completed successfully",
        opts.vmid
    );
    Ok(())
}

// Unit tests cover validation and plan construction only; nothing here may
// invoke qm. End-to-end runs live in the integration-tests crate.
#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> ToTemplateOpts {
        ToTemplateOpts {
            vmid: 9000,
            name: "debian-12-template".to_string(),
            iso: "/var/lib/vz/template/iso/debian-12.img".into(),
            ..Default::default()
        }
    }

    fn joined(steps: &[Step]) -> Vec<String> {
        steps.iter().map(|s| s.args.join(" ")).collect()
    }

    #[test]
    fn test_minimal_plan_sequence() -> Result<()> {
        let opts = base_opts();
        let steps = opts.plan(&opts.iso)?;

        let descs: Vec<_> = steps.iter().map(|s| s.desc).collect();
        assert_eq!(
            descs,
            vec![
                "Creating VM",
                "Configuring network",
                "Importing disk",
                "Configuring boot",
                "Converting to template",
            ]
        );

        let cmds = joined(&steps);
        assert_eq!(
            cmds[0],
            "create 9000 --name debian-12-template --ostype l26 --tablet 0"
        );
        assert_eq!(
            cmds[1],
            "set 9000 --net0 virtio,bridge=vmbr0 --memory 2046 --cores 2 --cpu host"
        );
        assert_eq!(
            cmds[2],
            "set 9000 --scsi0 local-lvm:0,import-from=/var/lib/vz/template/iso/debian-12.img,discard=on,ssd=1"
        );
        assert_eq!(cmds[4], "template 9000");

        // No VLAN and no cloud-init step with required flags only
        assert!(!cmds.iter().any(|c| c.contains("tag=")));
        assert!(!cmds.iter().any(|c| c.contains("cloudinit")));
        Ok(())
    }

    #[test]
    fn test_vlan_tag_in_network_step() -> Result<()> {
        let opts = ToTemplateOpts {
            vlan: Some(30),
            ..base_opts()
        };
        let steps = opts.plan(&opts.iso)?;
        let net_step = &steps[1];
        assert!(net_step
            .args
            .contains(&"virtio,bridge=vmbr0,tag=30".to_string()));
        Ok(())
    }

    #[test]
    fn test_cloud_init_steps_reference_snippet() -> Result<()> {
        let opts = ToTemplateOpts {
            cinit: Some("user.yaml".to_string()),
            ..base_opts()
        };
        let steps = opts.plan(&opts.iso)?;
        let cmds = joined(&steps);

        assert_eq!(steps.len(), 7);
        assert_eq!(cmds[4], "set 9000 --ide2 local-lvm:cloudinit --ipconfig0 ip=dhcp");
        assert_eq!(cmds[5], "set 9000 --cicustom user=local:snippets/user.yaml");
        // The template conversion stays last
        assert_eq!(steps.last().unwrap().desc, "Converting to template");
        Ok(())
    }

    #[test]
    fn test_custom_storage_and_bridge() -> Result<()> {
        let opts = ToTemplateOpts {
            storage: "tank".to_string(),
            bridge: "vmbr1".to_string(),
            vlan: Some(4094),
            ..base_opts()
        };
        let steps = opts.plan(&opts.iso)?;
        let cmds = joined(&steps);
        assert!(cmds[1].contains("virtio,bridge=vmbr1,tag=4094"));
        assert!(cmds[2].starts_with("set 9000 --scsi0 tank:0,import-from="));
        Ok(())
    }

    #[test]
    fn test_memory_and_cores_resolution() -> Result<()> {
        let opts = ToTemplateOpts {
            memory: MemoryOpts {
                memory: "4G".to_string(),
            },
            cores: 8,
            ..base_opts()
        };
        let steps = opts.plan(&opts.iso)?;
        assert!(steps[1].args.join(" ").contains("--memory 4096 --cores 8"));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_whitespace_name() {
        let opts = ToTemplateOpts {
            name: "my template".to_string(),
            ..base_opts()
        };
        assert!(opts.validate().is_err());

        let opts = ToTemplateOpts {
            name: String::new(),
            ..base_opts()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_vlan() {
        for vlan in [0u16, 4095] {
            let opts = ToTemplateOpts {
                vlan: Some(vlan),
                ..base_opts()
            };
            let err = opts.validate().unwrap_err();
            assert!(err.to_string().contains("802.1Q"), "vlan {vlan}: {err}");
        }

        let opts = ToTemplateOpts {
            vlan: Some(1),
            ..base_opts()
        };
        assert!(opts.validate().is_ok());
    }
}
