//! Template inspection for the cluster this node belongs to.
//!
//! Wraps the `pvesh` cluster resources query with both table and JSON
//! output formats, so an operator can check which vmids are taken before
//! building a new template.

use clap::Subcommand;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::pve;

/// Command-line options for template inspection.
#[derive(Debug, Subcommand)]
pub(crate) enum TemplatesOpts {
    /// List all VM templates known to the cluster
    List {
        /// Output as structured JSON instead of table format
        #[clap(long)]
        json: bool,
    },
}

impl TemplatesOpts {
    pub(crate) fn run(self) -> Result<()> {
        match self {
            TemplatesOpts::List { json } => {
                let templates = pve::list_templates()?;

                if json {
                    let json_output = serde_json::to_string_pretty(&templates)?;
                    println!("{}", json_output);
                } else {
                    let mut table = Table::new();
                    table
                        .load_preset(UTF8_FULL)
                        .set_header(vec!["VMID", "NAME", "NODE", "MEMORY", "DISK"]);

                    for t in templates {
                        table.add_row(vec![
                            t.vmid.to_string(),
                            t.name.clone().unwrap_or_else(|| "<none>".to_string()),
                            t.node.clone(),
                            indicatif::BinaryBytes(t.maxmem).to_string(),
                            indicatif::BinaryBytes(t.maxdisk).to_string(),
                        ]);
                    }

                    println!("{}", table);
                }
                Ok(())
            }
        }
    }
}
