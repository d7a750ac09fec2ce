use super::{Commands, XattrCommands};
use crate::config::Settings;
use crate::fs::ColumnFs;
use crate::fs::errors::FsError;
use crate::fs::permissions::Credentials;
use crate::fs::types::{AccessMask, FileKind, FileStat, OpenFlags, XattrFlags};
use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL};
use std::io::Write;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::error;

/// Runs one filesystem command. Returns the errno to exit with, 0 on success.
pub async fn run(
    config_path: &Path,
    creds: Credentials,
    show_stats: bool,
    command: Commands,
) -> Result<i32> {
    let settings = Settings::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let fs = ColumnFs::from_settings(&settings)
        .await
        .context("Failed to open the backing store")?;

    let result = execute(&fs, &creds, command).await;

    if show_stats {
        println!("{}", fs.stats.report());
    }
    fs.close().await?;

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("✗ {}", e);
            Ok(e.to_errno())
        }
    }
}

async fn execute(fs: &ColumnFs, creds: &Credentials, command: Commands) -> Result<(), FsError> {
    match command {
        Commands::Stat { path } => {
            let stat = fs.stat(&path).await?;
            print_stat(&path, &stat);
        }
        Commands::Ls { path } => {
            let entries = fs.read_directory(&path).await?;
            if entries.is_empty() {
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Mode", "Uid", "Gid", "Size", "Name"]);
            for entry in entries {
                table.add_row(vec![
                    mode_string(&entry.stat),
                    entry.stat.uid.to_string(),
                    entry.stat.gid.to_string(),
                    entry.stat.size.to_string(),
                    entry.name,
                ]);
            }
            println!("{table}");
        }
        Commands::Mkdir { path, mode } => {
            fs.make_directory(creds, &path, mode).await?;
            println!("✓ Created directory {}", path);
        }
        Commands::Touch { path, mode } => {
            fs.create_file(creds, &path, mode).await?;
            println!("✓ Created file {}", path);
        }
        Commands::Put { path } => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await.map_err(|e| {
                error!("Failed to read stdin: {}", e);
                FsError::IoError
            })?;

            let flags = OpenFlags::from_bits(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);
            fs.open(creds, &path, flags).await?;
            let written = fs.write(&path, 0, &data).await?;
            fs.release(&path).await?;
            println!("✓ Wrote {} bytes to {}", written, path);
        }
        Commands::Cat { path } => {
            let data = fs.read(&path, 0, usize::MAX).await?;
            std::io::stdout().write_all(&data).map_err(|e| {
                error!("Failed to write stdout: {}", e);
                FsError::IoError
            })?;
        }
        Commands::Rm { path } => {
            fs.delete_file(&path).await?;
            println!("✓ Removed {}", path);
        }
        Commands::Rmdir { path } => {
            fs.delete_directory(&path).await?;
            println!("✓ Removed directory {}", path);
        }
        Commands::Mv { from, to } => {
            fs.rename(&from, &to).await?;
            println!("✓ Renamed {} to {}", from, to);
        }
        Commands::Chmod { mode, path } => {
            fs.change_permissions(creds, &path, mode).await?;
            println!("✓ Mode of {} set to {:04o}", path, mode);
        }
        Commands::Chown {
            owner: (uid, gid),
            path,
        } => {
            fs.change_owner(creds, &path, uid, gid).await?;
            println!("✓ Owner of {} set to {}:{}", path, uid, gid);
        }
        Commands::Access { path, mode } => {
            let mask = parse_access_mask(&mode)?;
            fs.check_access(creds, &path, mask).await?;
            println!("✓ Access '{}' granted on {}", mode, path);
        }
        Commands::Truncate { path, size } => {
            fs.truncate(&path, size).await?;
            println!("✓ Truncated {} to {} bytes", path, size);
        }
        Commands::Statfs { path } => {
            let statfs = fs.filesystem_status(&path).await?;
            println!("Filesystem status:");
            println!("  Block size: {}", statfs.block_size);
            println!("  Fragment size: {}", statfs.fragment_size);
            println!(
                "  Blocks: {} total, {} free, {} available",
                statfs.blocks, statfs.blocks_free, statfs.blocks_available
            );
            println!(
                "  Files: {} total, {} free, {} available",
                statfs.files, statfs.files_free, statfs.files_available
            );
            println!("  Fsid: {}", statfs.fsid);
            println!("  Max name length: {}", statfs.name_max);
        }
        Commands::Xattr { subcommand } => execute_xattr(fs, subcommand).await?,
        Commands::Init { .. } | Commands::Debug { .. } => {
            error!("Command is not a filesystem operation");
            return Err(FsError::InvalidArgument);
        }
    }
    Ok(())
}

async fn execute_xattr(fs: &ColumnFs, command: XattrCommands) -> Result<(), FsError> {
    match command {
        XattrCommands::Get { path, name } => {
            let value = fs.get_extended_attribute(&path, &name, usize::MAX).await?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        XattrCommands::Set {
            path,
            name,
            value,
            create,
            replace,
        } => {
            let flags = match (create, replace) {
                (true, _) => XattrFlags::from_bits(libc::XATTR_CREATE),
                (_, true) => XattrFlags::from_bits(libc::XATTR_REPLACE),
                _ => XattrFlags::default(),
            };
            fs.set_extended_attribute(&path, &name, value.as_bytes(), flags)
                .await?;
            println!("✓ Set {} on {}", name, path);
        }
        XattrCommands::List { path } => {
            for name in fs.list_extended_attributes(&path).await? {
                println!("{}", name);
            }
        }
        XattrCommands::Rm { path, name } => {
            fs.remove_extended_attribute(&path, &name).await?;
            println!("✓ Removed {} from {}", name, path);
        }
    }
    Ok(())
}

fn parse_access_mask(mode: &str) -> Result<AccessMask, FsError> {
    let mut bits = libc::F_OK;
    for c in mode.chars() {
        bits |= match c {
            'r' => libc::R_OK,
            'w' => libc::W_OK,
            'x' => libc::X_OK,
            'f' => libc::F_OK,
            _ => return Err(FsError::InvalidArgument),
        };
    }
    Ok(AccessMask::from_bits(bits))
}

fn mode_string(stat: &FileStat) -> String {
    let kind = match stat.kind {
        FileKind::Directory => 'd',
        FileKind::Regular => '-',
    };
    let bits = ['r', 'w', 'x']
        .iter()
        .cycle()
        .take(9)
        .enumerate()
        .map(|(i, &c)| if stat.mode & (0o400 >> i) != 0 { c } else { '-' });
    std::iter::once(kind).chain(bits).collect()
}

fn print_stat(path: &str, stat: &FileStat) {
    let kind = match stat.kind {
        FileKind::Directory => "directory",
        FileKind::Regular => "regular file",
    };
    println!("  File: {}", path);
    println!(
        "  Size: {}  Blocks: {}  IO Block: {}  {}",
        stat.size, stat.blocks, stat.block_size, kind
    );
    println!(
        "  Mode: {:04o} ({})  Links: {}  Uid: {}  Gid: {}",
        stat.mode & 0o7777,
        mode_string(stat),
        stat.nlink,
        stat.uid,
        stat.gid
    );
    println!(
        "  Modify: {}.{:09}",
        stat.mtime.seconds, stat.mtime.nanoseconds
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::types::Timestamp;

    #[test]
    fn test_parse_access_mask() {
        assert_eq!(
            parse_access_mask("rx"),
            Ok(AccessMask {
                read: true,
                write: false,
                execute: true
            })
        );
        assert_eq!(parse_access_mask("f"), Ok(AccessMask::default()));
        assert_eq!(parse_access_mask("q"), Err(FsError::InvalidArgument));
    }

    #[test]
    fn test_mode_string() {
        let stat = FileStat {
            kind: FileKind::Directory,
            mode: 0o040750,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            blocks: 0,
            block_size: 4096,
            atime: Timestamp::EPOCH,
            mtime: Timestamp::EPOCH,
        };
        assert_eq!(mode_string(&stat), "drwxr-x---");
    }
}
