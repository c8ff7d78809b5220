//! CLI module - Command-line interface for Staffdesk
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Staffdesk - staff accounts and approval backoffice
#[derive(Parser)]
#[command(name = "staffdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    #[command(alias = "daemon")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Create the first super administrator
    Bootstrap {
        /// Email of the super administrator
        #[arg(long)]
        email: String,
        /// Initial password
        #[arg(long)]
        password: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// List accounts waiting for approval
    #[command(alias = "queue")]
    Pending,

    /// List accounts holding a role
    #[command(alias = "ls")]
    Active,
}

pub use commands::*;
