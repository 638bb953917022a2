//! Runtime monitor daemon.
//!
//! Polls health and the probes on a fixed period, commits tier changes to
//! the journal, and requests a reboot to apply them. A termination signal
//! lets the current tick finish, then the loop exits.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use pac_boot::{CommandActions, CommandAttestor, Monitor};
use pac_health::HealthOracle;
use pac_journal::Journal;
use pac_policy::PolicyConfig;
use pac_probe::{ProbeConfig, SystemProbes};
use tracing::info;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signal: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    // Async-signal-safe: the handler only stores into an atomic.
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

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
    attest_helper: PathBuf,
    reboot_helper: Option<PathBuf>,
    network_helper: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("/var/pac/journal.dat"),
            health_report: PathBuf::from("/var/pac/health.json"),
            config: None,
            verifier: None,
            attest_helper: PathBuf::from("/usr/lib/pac/attest"),
            reboot_helper: Some(PathBuf::from("/sbin/reboot")),
            network_helper: None,
        }
    }
}

fn print_help() {
    println!("Runtime tier monitor");
    println!();
    println!("Usage: pacmond [options]");
    println!();
    println!("Options:");
    println!("  --journal <path>         Journal file (default /var/pac/journal.dat)");
    println!("  --health-report <path>   Health report (default /var/pac/health.json)");
    println!("  --config <path>          Policy config JSON");
    println!("  --verifier <host:port>   Verifier endpoint");
    println!("  --attest-helper <path>   External attestation procedure");
    println!("  --reboot-helper <path>   Reboot command (default /sbin/reboot)");
    println!("  --no-reboot              Commit tier changes without rebooting");
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
                options.attest_helper = PathBuf::from(value_for("--attest-helper")?);
            }
            "--reboot-helper" => {
                options.reboot_helper = Some(PathBuf::from(value_for("--reboot-helper")?));
            }
            "--no-reboot" => options.reboot_helper = None,
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
            eprintln!("pacmond: {err}");
            return 1;
        }
    };

    let mut journal = match Journal::open_or_init(&options.journal) {
        Ok(journal) => journal,
        Err(err) => {
            eprintln!("pacmond: {err}");
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
    let mut attestor = CommandAttestor::new(options.attest_helper);
    let mut actions = CommandActions {
        mount_helper: None,
        network_helper: options.network_helper,
        reboot_helper: options.reboot_helper,
    };

    install_signal_handlers();
    info!(interval = cfg.monitor_interval_secs, "monitor starting");

    let mut monitor = Monitor::new(
        &cfg,
        &mut journal,
        &oracle,
        &probes,
        &mut attestor,
        &mut actions,
    );
    monitor.run(&STOP);
    0
}
