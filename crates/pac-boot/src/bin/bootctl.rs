//! Boot-time entry point: runs one pass of the tier ladder and prints the
//! terminal state.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use pac_boot::{BootController, BootState, CommandActions, CommandAttestor};
use pac_health::HealthOracle;
use pac_journal::Journal;
use pac_policy::PolicyConfig;
use pac_probe::{ProbeConfig, SystemProbes};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = run_cli(std::env::args_os());
    std::process::exit(code);
}

struct Options {
    journal: PathBuf,
    health_report: PathBuf,
    config: Option<PathBuf>,
    verifier: Option<String>,
    attest_helper: Option<PathBuf>,
    mount_helper: Option<PathBuf>,
    network_helper: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("/var/pac/journal.dat"),
            health_report: PathBuf::from("/var/pac/health.json"),
            config: None,
            verifier: None,
            attest_helper: None,
            mount_helper: None,
            network_helper: None,
        }
    }
}

fn print_help() {
    println!("Tier ladder boot pass");
    println!();
    println!("Usage: bootctl [options]");
    println!();
    println!("Options:");
    println!("  --journal <path>         Journal file (default /var/pac/journal.dat)");
    println!("  --health-report <path>   Health report (default /var/pac/health.json)");
    println!("  --config <path>          Policy config JSON");
    println!("  --verifier <host:port>   Verifier endpoint");
    println!("  --attest-helper <path>   External attestation procedure");
    println!("  --mount-helper <path>    Tier-root mount helper");
    println!("  --network-helper <path>  Network bring-up helper");
    println!("  -h, --help               Show this help");
}

fn parse_options(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value_for = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--journal" => options.journal = PathBuf::from(value_for("--journal")?),
            "--health-report" => {
                options.health_report = PathBuf::from(value_for("--health-report")?);
            }
            "--config" => options.config = Some(PathBuf::from(value_for("--config")?)),
            "--verifier" => options.verifier = Some(value_for("--verifier")?),
            "--attest-helper" => {
                options.attest_helper = Some(PathBuf::from(value_for("--attest-helper")?));
            }
            "--mount-helper" => {
                options.mount_helper = Some(PathBuf::from(value_for("--mount-helper")?));
            }
            "--network-helper" => {
                options.network_helper = Some(PathBuf::from(value_for("--network-helper")?));
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Some(options))
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

    let options = match parse_options(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_help();
            return 0;
        }
        Err(message) => {
            eprintln!("{message}");
            print_help();
            return 1;
        }
    };

    let cfg = match PolicyConfig::load_or_default(options.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("bootctl: {err}");
            return 1;
        }
    };

    let mut journal = match Journal::open_or_init(&options.journal) {
        Ok(journal) => journal,
        Err(err) => {
            eprintln!("bootctl: {err}");
            return 2;
        }
    };

    let mut probe_config = ProbeConfig::default();
    if let Some(verifier) = options.verifier {
        probe_config.stability_target.clone_from(&verifier);
        probe_config.verifier_addr = verifier;
    }
    let probes = SystemProbes::new(probe_config);
    let oracle = HealthOracle::new(options.health_report);
    let mut attestor = CommandAttestor::new(
        options
            .attest_helper
            .unwrap_or_else(|| PathBuf::from("/usr/lib/pac/attest")),
    );
    let mut actions = CommandActions {
        mount_helper: options.mount_helper,
        network_helper: options.network_helper,
        reboot_helper: None,
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    let mut controller =
        BootController::new(&cfg, &mut journal, &oracle, &probes, &mut attestor, &mut actions);
    match controller.run_boot_pass(now) {
        Ok(outcome) => {
            let state = match outcome.state {
                BootState::Tier3 => "tier3",
                BootState::Tier2 => "tier2",
                BootState::Emergency => "emergency",
                _ => "tier1",
            };
            println!("terminal={state} tier={} boot={}", outcome.record.tier, outcome.record.boot_count);
            for (tier, reason) in &outcome.refusals {
                println!("refused tier{tier}: {reason}");
            }
            0
        }
        Err(err) => {
            eprintln!("bootctl: {err}");
            2
        }
    }
}
