//! Rolegate CLI Module
//! Command-line interface for provisioning modules and managing roles

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::rbac::{AccessMask, Action, ResourceType, RoleId};

#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(version)]
#[command(about = "Module-scoped role access control", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a project in the project directory
    Init {
        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Start the REST API server
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show project status
    Status,

    /// Module registry administration
    Module {
        #[command(subcommand)]
        action: ModuleAction,
    },

    /// Resource types the permission store grants against
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Role management
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ModuleAction {
    /// List modules and their resource types
    List,

    /// Create a module
    Add {
        /// Module name
        name: String,
    },

    /// Delete a module, revoking what its grants projected
    Remove {
        /// Module name
        name: String,
    },

    /// Put a resource type under a module
    Assign {
        /// Module name
        module: String,

        /// Resource type as app_label.model
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,
    },

    /// Take a resource type away from a module
    Unassign {
        /// Module name
        module: String,

        /// Resource type as app_label.model
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,
    },
}

#[derive(Subcommand, Debug)]
pub enum ResourceAction {
    /// Register a resource type and provision its permissions
    Add {
        /// Resource type as app_label.model
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,

        /// Assign it to this module right away
        #[arg(short, long)]
        module: Option<String>,
    },

    /// List resource types and their owning module
    List,
}

#[derive(Subcommand, Debug)]
pub enum RoleAction {
    /// List roles
    List,

    /// Show a role with its access
    Show {
        /// Role ID
        id: RoleId,
    },

    /// Create a role
    Create {
        /// Role name
        name: String,

        /// Access payload as JSON, e.g. '{"Billing": {"read": 1, "create": 0, "update": 0, "delete": 0}}'
        #[arg(short, long)]
        access: Option<String>,
    },

    /// Change a role's access
    SetAccess {
        /// Role ID
        id: RoleId,

        /// Access payload as JSON
        #[arg(short, long, conflicts_with_all = ["module", "actions"])]
        access: Option<String>,

        /// Single module to set
        #[arg(short, long, requires = "actions")]
        module: Option<String>,

        /// Allowed actions for --module, comma separated, or "none"
        #[arg(long, value_parser = parse_mask, requires = "module")]
        actions: Option<AccessMask>,
    },

    /// Rename a role
    Rename {
        /// Role ID
        id: RoleId,

        /// New name
        name: String,
    },

    /// Delete a role
    Delete {
        /// Role ID
        id: RoleId,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

fn parse_resource_type(s: &str) -> Result<ResourceType, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// `read,update` -> mask; `none` -> empty mask
pub fn parse_mask(s: &str) -> Result<AccessMask, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") {
        return Ok(AccessMask::EMPTY);
    }
    s.split(',')
        .map(|name| name.trim().parse::<Action>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .map(AccessMask::from_actions)
}
