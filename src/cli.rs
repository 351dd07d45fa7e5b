//! Command-line surface.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Live backup archive writer.
///
/// Orchestrates the two local sockets a hypervisor backup uses (vmstate
/// migration and NBD block-backup) and funnels both into a single VMA
/// archive file.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Backup archive filename.
    #[arg(long)]
    pub output: PathBuf,

    /// UNIX domain socket endpoint for the incoming vmstate migration.
    #[arg(long)]
    pub incoming: PathBuf,

    /// UNIX domain socket endpoint for the NBD block-backup server.
    #[arg(long)]
    pub nbd: PathBuf,

    /// Drive to back up, as `name=<device>,size=<bytes>`. Repeatable.
    #[arg(long = "drive", value_name = "SPEC")]
    pub drives: Vec<DriveSpec>,
}

/// One `--drive name=...,size=...` occurrence.
#[derive(Debug, Clone)]
pub struct DriveSpec {
    pub name: String,
    pub size: u64,
}

impl FromStr for DriveSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut name = None;
        let mut size = None;

        for kv in s.split(',') {
            let (key, value) = kv
                .split_once('=')
                .ok_or_else(|| format!("drive spec entry {kv:?} is not key=value"))?;
            match key {
                "name" => name = Some(value.to_string()),
                "size" => {
                    size = Some(
                        value
                            .parse::<u64>()
                            .map_err(|e| format!("invalid drive size {value:?}: {e}"))?,
                    )
                }
                other => return Err(format!("unknown drive spec key {other:?}")),
            }
        }

        Ok(DriveSpec {
            name: name.ok_or("drive spec missing name=")?,
            size: size.ok_or("drive spec missing size=")?,
        })
    }
}
