//! # memscope - Main Entry Point
//!
//! Decodes a trace from a file (`memscope trace.bin`) or from a live agent
//! (`memscope --port 7777`) and either prints each allocation with its
//! stack, exports JSON lines (`--json`) or only aggregates (`--summary`).

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::{self, BufWriter, Write};

use memscope::allocation::Allocation;
use memscope::cli::Args;
use memscope::export::{AllocationExporter, AllocationSummary};
use memscope::reader::RecordReader;
use memscope::source::{FileSource, SocketSource, Source, SourceConfig};
use memscope::symbolization::{SegmentResolver, SymbolResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

type TraceReader = RecordReader<Box<dyn Source>, SegmentResolver>;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Open the trace named on the command line
fn open_source(args: &Args, config: &SourceConfig) -> Result<Box<dyn Source>> {
    if let Some(ref path) = args.file {
        let source = FileSource::open(path, config)
            .with_context(|| format!("Failed to open trace file {}", path.display()))?;
        return Ok(Box::new(source));
    }

    if let Some(port) = args.port {
        let source = SocketSource::connect((args.host.as_str(), port), config)
            .with_context(|| format!("Failed to connect to agent at {}:{port}", args.host))?;
        return Ok(Box::new(source));
    }

    anyhow::bail!(
        "Missing required argument: FILE or --port\n\n\
         Usage:\n  \
         memscope trace.bin          Decode a trace file\n  \
         memscope --port 7777        Decode a live trace\n\n\
         Run 'memscope --help' for more options"
    )
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = SourceConfig::default();

    let source = open_source(&args, &config)?;
    let mut reader: TraceReader =
        RecordReader::open(source, SegmentResolver::new()).context("Failed to read trace header")?;

    let header = reader.header();
    if args.native && !header.native_traces {
        info!("Trace was recorded without native stacks");
    }
    if !args.quiet && !args.json {
        println!("memscope v{}", env!("CARGO_PKG_VERSION"));
        println!("command: {}", header.command_line);
        println!(
            "recorded: {} allocations, {} frames over {}ms",
            header.stats.n_allocations,
            header.stats.n_frames,
            header.stats.duration_ms()
        );
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.json {
        let mut exporter = AllocationExporter::new(out, args.max_depth, args.native);
        while let Some(allocation) = reader.next_allocation().context("Failed to decode trace")? {
            exporter.write_allocation(&reader, &allocation)?;
        }
        info!("Exported {} allocations", exporter.written());
        out = exporter.finish()?;
    } else if args.summary {
        let mut summary = AllocationSummary::default();
        while let Some(allocation) = reader.next_allocation().context("Failed to decode trace")? {
            summary.record(&allocation);
        }
        writeln!(out, "{}", summary.format())?;
    } else {
        while let Some(allocation) = reader.next_allocation().context("Failed to decode trace")? {
            print_allocation(&mut out, &reader, &allocation, &args)?;
        }
    }

    out.flush().context("Failed to write output")?;
    reader.close();
    Ok(())
}

fn print_allocation<W: Write, S: Source, R: SymbolResolver>(
    out: &mut W,
    reader: &RecordReader<S, R>,
    allocation: &Allocation,
    args: &Args,
) -> Result<()> {
    let record = &allocation.record;
    writeln!(
        out,
        "{} {} 0x{:x} ({} bytes)",
        record.tid, record.allocator, record.address, record.size
    )?;

    for frame in reader.frames(allocation.frame_handle, args.max_depth) {
        writeln!(out, "    {}", frame?)?;
    }

    if args.native {
        let native = reader.native_stack_trace(
            record.native_index,
            allocation.native_generation,
            args.max_depth,
        )?;
        for frame in native {
            writeln!(out, "    {frame}")?;
        }
    }
    Ok(())
}
