//! drtrace-view
//!
//! Replays a finished trace file, reporting advisory violations and summary
//! statistics on stderr. Exits 1 on a malformed stream, an I/O failure or a
//! usage error.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use drtrace_core::BlockId;
use drtrace_replay::{ReplayConfig, Replayer};
use memmap2::Mmap;
use std::fs::File;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drtrace-view", version)]
#[command(about = "Replay a drtrace file and report live blocks and violations", long_about = None)]
struct Cli {
    /// Report creation and deletion of this block id (hex, `0x` optional)
    #[arg(long = "track-bb", value_name = "HEX")]
    track_bb: Option<BlockId>,

    /// Skip the code dump of the tracked block
    #[arg(long)]
    no_code_dump: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Trace file to replay
    #[arg(default_value = "./trace.out")]
    trace_file: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = i32::from(err.use_stderr());
            err.print().wrap_err("failed to print usage")?;
            std::process::exit(code);
        }
    };
    init_tracing();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let file = File::open(&cli.trace_file)
        .wrap_err_with(|| format!("failed to open {}", cli.trace_file.display()))?;
    let size = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat {}", cli.trace_file.display()))?
        .len();
    tracing::info!(size, path = %cli.trace_file.display(), "trace file");

    // Mapping an empty file fails on some platforms.
    let map = if size == 0 {
        None
    } else {
        // SAFETY: the trace is a finished file; nothing appends to it while it
        // is mapped.
        let map = unsafe { Mmap::map(&file) }
            .wrap_err_with(|| format!("failed to map {}", cli.trace_file.display()))?;
        Some(map)
    };
    let bytes: &[u8] = map.as_deref().unwrap_or_default();

    let mut config = ReplayConfig::default().with_dump_code(!cli.no_code_dump);
    if let Some(id) = cli.track_bb {
        config = config.with_track_block(id);
    }

    let state = Replayer::new(config).replay(bytes)?;
    let summary = state.summary();
    tracing::info!(records = summary.records, "record count");
    tracing::info!(live_blocks = summary.live_blocks, "live block count");
    tracing::info!(blocks_executed = summary.blocks_executed, "blocks executed");
    if summary.violations.total() > 0 {
        tracing::warn!(
            duplicate_blocks = summary.violations.duplicate_blocks,
            dangling_deletes = summary.violations.dangling_deletes,
            dangling_executions = summary.violations.dangling_executions,
            "advisory violations"
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["drtrace-view"]).unwrap();
        assert_eq!(cli.trace_file, PathBuf::from("./trace.out"));
        assert!(cli.track_bb.is_none());
        assert!(!cli.no_code_dump);
        assert!(!cli.json);
    }

    #[test]
    fn test_track_bb_hex() {
        let cli = Cli::try_parse_from(["drtrace-view", "--track-bb", "0x2a", "t.out"]).unwrap();
        assert_eq!(cli.track_bb, Some(BlockId::new(0x2a)));
        assert_eq!(cli.trace_file, PathBuf::from("t.out"));

        let cli = Cli::try_parse_from(["drtrace-view", "--track-bb", "ff"]).unwrap();
        assert_eq!(cli.track_bb, Some(BlockId::new(0xff)));
    }

    #[test]
    fn test_track_bb_missing_value() {
        let err = Cli::try_parse_from(["drtrace-view", "--track-bb"])
            .err()
            .unwrap();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_track_bb_invalid() {
        assert!(Cli::try_parse_from(["drtrace-view", "--track-bb", "zz"]).is_err());
    }
}
