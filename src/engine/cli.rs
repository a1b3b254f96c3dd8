//! RBAC Manager CLI Module
//! Command-line interface over a SQLite-backed manager

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rbac")]
#[command(author = "RBAC Manager Team")]
#[command(version)]
#[command(about = "Role-based access control manager", long_about = None)]
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
    /// Initialize a project: config file and database
    Init {
        /// Role granted to every user (repeatable)
        #[arg(short, long = "default-role")]
        default_roles: Vec<String>,
    },

    /// Role management
    Role {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Permission management
    Permission {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Hierarchy management
    Child {
        #[command(subcommand)]
        action: ChildAction,
    },

    /// Assign a role or permission to a user
    Assign {
        /// User ID
        user: String,

        /// Role or permission name
        item: String,
    },

    /// Revoke a role or permission from a user
    Revoke {
        /// User ID
        user: String,

        /// Role or permission name
        #[arg(required_unless_present = "all")]
        item: Option<String>,

        /// Revoke every direct assignment
        #[arg(long)]
        all: bool,
    },

    /// Check whether a user holds a permission
    Check {
        /// User ID
        user: String,

        /// Permission name
        permission: String,
    },

    /// Show a user's roles and permissions
    User {
        /// User ID
        user: String,
    },

    /// List users holding a role, directly or through a parent role
    Members {
        /// Role name
        role: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ItemAction {
    /// Create a new item
    Add {
        /// Item name
        name: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Delete an item with its edges and assignments
    Remove {
        /// Item name
        name: String,
    },

    /// Rename an item
    Rename {
        /// Current name
        name: String,

        /// New name
        new_name: String,
    },

    /// List items
    List,
}

#[derive(Subcommand, Debug)]
pub enum ChildAction {
    /// Attach a child item to a parent
    Add {
        parent: String,
        child: String,
    },

    /// Detach a child item from a parent
    Remove {
        parent: String,
        child: String,
    },

    /// Detach all children from a parent
    Clear {
        parent: String,
    },

    /// List descendants of a role
    List {
        role: String,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
