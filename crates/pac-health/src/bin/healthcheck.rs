//! Health check entry point.
//!
//! Runs the collector, optionally writes the JSON report, and exits with
//! the coarse classification: 0 healthy, 1 degraded, 2 critical, 3 when
//! inputs could not be read at all.

use std::ffi::OsString;
use std::path::PathBuf;

use pac_health::{classify_score, HealthClass, HealthCollector, HealthCollectorConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = run_cli(std::env::args_os());
    std::process::exit(code);
}

fn print_help() {
    println!("Device health check");
    println!();
    println!("Usage: healthcheck [options]");
    println!();
    println!("Options:");
    println!("  --json             Print the report as JSON instead of text");
    println!("  --output <path>    Also write the JSON report to <path>");
    println!("  -h, --help         Show this help");
    println!();
    println!("Exit codes: 0 healthy, 1 degraded, 2 critical, 3 input error");
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let args: Vec<String> = os_args
        .into_iter()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let mut json_output = false;
    let mut output: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return 0;
            }
            "--json" => json_output = true,
            "--output" => match iter.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--output requires a path");
                    return 3;
                }
            },
            other => {
                eprintln!("unknown argument: {other}");
                print_help();
                return 3;
            }
        }
    }

    let report = HealthCollector::new(HealthCollectorConfig::default()).run();

    if json_output {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("failed to serialize report: {err}");
                return 3;
            }
        }
    } else {
        print!("{}", report.render_text());
    }

    if let Some(path) = output {
        if let Err(err) = report.write_to(&path) {
            eprintln!("failed to write report to {}: {err}", path.display());
            return 3;
        }
    }

    match classify_score(report.overall_score) {
        HealthClass::Healthy => 0,
        HealthClass::Degraded => 1,
        HealthClass::Critical => 2,
    }
}
