//! spikeio CLI - inspect and convert spike-sorting outputs.

use std::env;
use std::path::Path;
use std::process;

use spikeio::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level: Option<&str> = None;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = Some("debug"),
            "-vv" | "--trace" => level = Some("trace"),
            "-q" | "--quiet" => level = Some("warn"),
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "info" | "i" => {
            if filtered_args.len() < 3 {
                eprintln!("Error: missing arguments");
                eprintln!("Usage: spikeio info <format> <path>");
                process::exit(1);
            }
            cmd_info(filtered_args[1], filtered_args[2])
        }
        "convert" | "c" => {
            if filtered_args.len() < 5 {
                eprintln!("Error: missing arguments");
                eprintln!("Usage: spikeio convert <in-format> <in-path> <out-format> <out-path>");
                process::exit(1);
            }
            cmd_convert(filtered_args[1], filtered_args[2], filtered_args[3], filtered_args[4])
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// `RUST_LOG` wins unless a verbosity flag was given; default is `info`.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!("spikeio - spike-sorting output toolkit");
    println!();
    println!("USAGE:");
    println!("    spikeio [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info    <format> <path>                       Show units, properties and event counts");
    println!("    c, convert <in-format> <in> <out-format> <out>   Convert between formats");
    println!("    h, help                                          Show this help");
    println!();
    println!("FORMATS:");
    println!("    alf, hdsort, yass");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show warnings and errors");
    println!();
    println!("EXAMPLES:");
    println!("    spikeio info alf session/probe00");
    println!("    spikeio convert hdsort sorting.spk alf out/probe00");
}

fn cmd_info(format: &str, path: &str) -> Result<()> {
    let format: Format = format.parse()?;
    let sorting = format.open(Path::new(path))?;
    tracing::debug!(%format, path, "opened");

    let ids = sorting.unit_ids();
    println!("Source:        {} ({})", path, sorting.format_name());
    println!("Sampling rate: {} Hz", sorting.sampling_rate());
    println!("Units:         {}", ids.len());
    println!("Properties:    {}", join_or_none(&sorting.property_names()));
    println!("Features:      {}", join_or_none(&sorting.feature_names()));
    println!();

    let mut total = 0usize;
    for &unit in &ids {
        let events = sorting.full_event_sequence(unit)?;
        total += events.len();
        match (events.first(), events.last()) {
            (Some(first), Some(last)) => {
                println!("  unit {:>6}: {:>8} events  [{} .. {}]", unit, events.len(), first, last)
            }
            _ => println!("  unit {:>6}: {:>8} events", unit, 0),
        }
    }
    println!();
    println!("Total events: {}", total);
    Ok(())
}

fn cmd_convert(in_format: &str, in_path: &str, out_format: &str, out_path: &str) -> Result<()> {
    let in_format: Format = in_format.parse()?;
    let out_format: Format = out_format.parse()?;
    let source = in_format.open(Path::new(in_path))?;
    tracing::info!(units = source.num_units(), "read {} from {}", in_format, in_path);
    out_format.write(source.as_ref(), Path::new(out_path))
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
