use std::path::PathBuf;

use clap::{Parser, Subcommand};
use security::PermissionSet;
use utils::app_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "ntacl")]
#[command(version, about = "Read and change file owners and DACLs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set the logging level (debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Additional TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the account that owns a file or directory
    Owner {
        /// File or directory
        path: PathBuf,
    },

    /// Make an account the owner of a file or directory
    SetOwner {
        /// File or directory
        path: PathBuf,

        /// Account name, e.g. 'Administrators' or 'DOMAIN\alice'
        account: String,
    },

    /// Replace the DACL: the owner gets PERMISSIONS, Administrators get full control
    Grant {
        /// File or directory
        path: PathBuf,

        /// Owner permissions as a triplet such as 'rw-' or 'r-x'
        #[arg(value_parser = parse_permissions)]
        permissions: PermissionSet,
    },

    /// Show the owner and the DACL entries
    Show {
        /// File or directory
        path: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_permissions(value: &str) -> Result<PermissionSet, String> {
    value.parse::<PermissionSet>().map_err(|e| e.to_string())
}

pub fn cli_match() -> utils::error::Result<()> {
    let cli = Cli::parse();

    // 命令行参数优先于配置文件
    AppConfig::merge_config(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        AppConfig::set("log.level", level)?;
    }

    let _guard = utils::logger::setup_logging()?;

    match cli.command {
        Commands::Owner { path } => commands::owner_cmd(&path)?,
        Commands::SetOwner { path, account } => commands::set_owner_cmd(&path, &account)?,
        Commands::Grant { path, permissions } => commands::grant_cmd(&path, permissions)?,
        Commands::Show { path, json } => commands::show_cmd(&path, json)?,
    }

    Ok(())
}
