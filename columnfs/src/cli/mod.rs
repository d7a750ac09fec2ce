use crate::fs::permissions::Credentials;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod debug;
pub mod ops;

#[derive(Parser)]
#[command(name = "columnfs")]
#[command(author, version, about = "A POSIX-like filesystem kept entirely in a wide-column store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, default_value = "columnfs.toml")]
    pub config: PathBuf,

    /// Act as this uid instead of the current user
    #[arg(long, global = true)]
    pub uid: Option<u32>,

    /// Act as this gid instead of the current group
    #[arg(long, global = true)]
    pub gid: Option<u32>,

    /// Print operation statistics after the command
    #[arg(long, global = true)]
    pub stats: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a default configuration file
    Init {
        #[arg(default_value = "columnfs.toml")]
        path: PathBuf,
    },
    /// Show the attributes of a file or directory
    Stat { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Create a directory
    Mkdir {
        path: String,
        #[arg(short, long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    /// Create an empty file
    Touch {
        path: String,
        #[arg(short, long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    /// Write stdin to a file, creating or truncating it
    ///
    /// cat photo.jpg | columnfs put /photos/photo.jpg
    Put { path: String },
    /// Print the content of a file
    Cat { path: String },
    /// Remove a file
    Rm { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Rename a file or directory
    Mv { from: String, to: String },
    /// Change permission bits (octal)
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,
        path: String,
    },
    /// Change owner, given as uid:gid
    Chown {
        #[arg(value_parser = parse_owner)]
        owner: (u32, u32),
        path: String,
    },
    /// Check access for any combination of r, w and x (f for existence)
    Access {
        path: String,
        #[arg(default_value = "r")]
        mode: String,
    },
    /// Resize a file, zero filling when it grows
    Truncate { path: String, size: u64 },
    /// Show filesystem statistics
    Statfs {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Extended attribute commands
    Xattr {
        #[command(subcommand)]
        subcommand: XattrCommands,
    },
    /// Debug commands for inspecting the store
    Debug {
        #[command(subcommand)]
        subcommand: DebugCommands,
    },
}

#[derive(Subcommand)]
pub enum XattrCommands {
    /// Print one attribute
    Get { path: String, name: String },
    /// Set an attribute
    Set {
        path: String,
        name: String,
        value: String,
        /// Fail if the attribute already exists
        #[arg(long, conflicts_with = "replace")]
        create: bool,
        /// Fail if the attribute does not exist yet
        #[arg(long)]
        replace: bool,
    },
    /// List attribute names
    List { path: String },
    /// Remove an attribute
    Rm { path: String, name: String },
}

#[derive(Subcommand)]
pub enum DebugCommands {
    /// List all keys in the store
    ListKeys,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("'{s}' is not an octal mode: {e}"))
}

fn parse_owner(s: &str) -> Result<(u32, u32), String> {
    let (uid, gid) = s
        .split_once(':')
        .ok_or_else(|| format!("'{s}' is not of the form uid:gid"))?;
    let uid = uid.parse().map_err(|e| format!("bad uid '{uid}': {e}"))?;
    let gid = gid.parse().map_err(|e| format!("bad gid '{gid}': {e}"))?;
    Ok((uid, gid))
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn credentials(&self) -> Credentials {
        let current = Credentials::current();
        Credentials::new(
            self.uid.unwrap_or(current.uid),
            self.gid.unwrap_or(current.gid),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755"), Ok(0o755));
        assert_eq!(parse_mode("0o4750"), Ok(0o4750));
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_parse_owner() {
        assert_eq!(parse_owner("1000:100"), Ok((1000, 100)));
        assert!(parse_owner("1000").is_err());
        assert!(parse_owner("a:1").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["columnfs", "ls", "/docs", "--uid", "0", "-c", "x.toml"])
            .unwrap();
        assert_eq!(cli.uid, Some(0));
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Commands::Ls { path } if path == "/docs"));
    }
}
