//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "memscope",
    about = "Decode memory allocation traces and rebuild their call stacks",
    after_help = "\
EXAMPLES:
    memscope trace.bin                        Print every allocation with its stack
    memscope trace.bin --native --json        Export allocations as JSON lines
    memscope --port 7777 --summary            Read a live trace from a local agent"
)]
pub struct Args {
    /// Trace file to decode
    #[arg(value_name = "FILE", conflicts_with = "port")]
    pub file: Option<PathBuf>,

    /// Read the trace from an agent listening on this TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host of the agent (with --port)
    #[arg(long, default_value = "127.0.0.1", requires = "port")]
    pub host: String,

    /// Maximum number of frames reported per stack
    #[arg(long, default_value = "128")]
    pub max_depth: usize,

    /// Resolve native stacks as well
    #[arg(long)]
    pub native: bool,

    /// Write allocations to stdout as JSON lines
    #[arg(long, conflicts_with = "summary")]
    pub json: bool,

    /// Only print aggregate statistics
    #[arg(long)]
    pub summary: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
