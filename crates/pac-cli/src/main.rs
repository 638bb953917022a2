//! Administrative boot-journal tool.
//!
//! Reads and modifies the journal file directly. Writing while the runtime
//! monitor is running is unsafe (single-writer journal); stop the monitor
//! first.

use std::ffi::OsString;
use std::path::Path;

use pac_error::{ExitCode, PacError, Result};
use pac_journal::Journal;
use pac_types::{BootFlags, BootRecord, Tier};

const DEFAULT_JOURNAL_PATH: &str = "/var/pac/journal.dat";

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
    println!("Boot journal tool");
    println!();
    println!("Usage: pac-journalctl <command> [args...] [journal-file]");
    println!();
    println!("Commands:");
    println!("  init                    Initialize a journal and print the record");
    println!("  read [--json]           Display journal contents");
    println!("  set-tier <1|2|3>        Set the committed tier");
    println!("  dec-tries <2|3>         Decrement a tier attempt counter");
    println!("  reset-tries             Restore both attempt counters");
    println!("  set-flag <name>         Set a status flag");
    println!("  clear-flag <name>       Clear a status flag");
    println!("  inc-boot                Increment the boot counter");
    println!();
    println!("Flags: emergency, quarantine, brownout, dirty, network_gated");
    println!();
    println!("The journal file defaults to {DEFAULT_JOURNAL_PATH}.");
    println!("Examples:");
    println!("  pac-journalctl read /var/pac/journal.dat");
    println!("  pac-journalctl set-tier 2 /var/pac/journal.dat");
    println!("  pac-journalctl set-flag brownout /var/pac/journal.dat");
}

fn record_json(rec: &BootRecord) -> serde_json::Value {
    serde_json::json!({
        "version": rec.version,
        "tier": rec.tier.as_u8(),
        "tries_t2": rec.tries_t2,
        "tries_t3": rec.tries_t3,
        "rollback_idx": rec.rollback_idx,
        "flags": rec.flags.bits(),
        "flag_names": rec.flags.describe(),
        "boot_count": rec.boot_count,
        "timestamp": rec.timestamp,
    })
}

fn parse_tier(raw: &str) -> Result<Tier> {
    raw.parse::<u8>()
        .ok()
        .and_then(Tier::from_raw)
        .ok_or_else(|| PacError::InvalidTier {
            value: raw.to_owned(),
        })
}

fn run_command(command: &str, args: &[String], path: &Path) -> Result<()> {
    let mut journal = Journal::open_or_init(path)?;
    let mut rec = journal.read()?;

    match command {
        "init" => {
            println!("Initialized journal at {}", path.display());
            println!("{rec}");
        }
        "read" => {
            if args.first().is_some_and(|arg| arg == "--json") {
                println!("{}", serde_json::to_string_pretty(&record_json(&rec)).expect("record serializes"));
            } else {
                println!("{rec}");
            }
        }
        "set-tier" => {
            let raw = args.first().ok_or_else(|| PacError::InvalidTier {
                value: "<missing>".to_owned(),
            })?;
            rec.tier = parse_tier(raw)?;
            journal.write(&mut rec)?;
            println!("Set tier to {}", rec.tier);
        }
        "dec-tries" => {
            let raw = args.first().ok_or(PacError::BadTier { tier: 0 })?;
            let tier = parse_tier(raw).map_err(|_| PacError::BadTier {
                tier: raw.parse::<u8>().unwrap_or(0),
            })?;
            let remaining = rec.decrement_tries(tier)?;
            journal.write(&mut rec)?;
            println!("Tier-{tier} attempts remaining: {remaining}");
        }
        "reset-tries" => {
            rec.reset_tries();
            journal.write(&mut rec)?;
            println!("Reset attempt counters");
        }
        "set-flag" => {
            let name = args.first().ok_or_else(|| PacError::BadFlag {
                name: "<missing>".to_owned(),
            })?;
            let flag = BootFlags::parse_name(name)?;
            rec.flags.insert(flag);
            journal.write(&mut rec)?;
            println!("Set flag {name}");
        }
        "clear-flag" => {
            let name = args.first().ok_or_else(|| PacError::BadFlag {
                name: "<missing>".to_owned(),
            })?;
            let flag = BootFlags::parse_name(name)?;
            if flag.contains(BootFlags::BROWNOUT) {
                rec.flags = rec.flags.clear_brownout();
            } else {
                rec.flags.remove(flag);
            }
            journal.write(&mut rec)?;
            println!("Cleared flag {name}");
        }
        "inc-boot" => {
            journal.increment_boot_count(&mut rec)?;
            println!("Boot count: {}", rec.boot_count);
        }
        other => {
            return Err(PacError::config(format!("unknown command: {other}")));
        }
    }
    Ok(())
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

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::Usage as i32;
    };
    if command == "-h" || command == "--help" {
        print_help();
        return ExitCode::Ok as i32;
    }

    // The last argument is the journal path when it looks like one;
    // otherwise the default location applies.
    let known_commands = [
        "init",
        "read",
        "set-tier",
        "dec-tries",
        "reset-tries",
        "set-flag",
        "clear-flag",
        "inc-boot",
    ];
    if !known_commands.contains(&command.as_str()) {
        eprintln!("Unknown command: {command}");
        print_help();
        return ExitCode::Usage as i32;
    }

    let mut rest: Vec<String> = args[1..].to_vec();
    let take_path = rest
        .last()
        .is_some_and(|last| !last.starts_with("--") && !is_command_operand(command, last));
    let path = if take_path {
        std::path::PathBuf::from(rest.pop().expect("checked non-empty"))
    } else {
        std::path::PathBuf::from(DEFAULT_JOURNAL_PATH)
    };

    match run_command(command, &rest, &path) {
        Ok(()) => ExitCode::Ok as i32,
        Err(err) => {
            eprintln!("pac-journalctl: {err}");
            err.exit_code() as i32
        }
    }
}

/// Operand values that belong to the command itself, not the path slot.
fn is_command_operand(command: &str, value: &str) -> bool {
    match command {
        "set-tier" | "dec-tries" => matches!(value, "1" | "2" | "3"),
        "set-flag" | "clear-flag" => BootFlags::parse_name(value).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn cli(args: &[&str]) -> i32 {
        let mut full = vec![OsString::from("pac-journalctl")];
        full.extend(args.iter().map(OsString::from));
        run_cli(full)
    }

    fn temp_journal() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("journal.dat");
        let path_str = path.to_string_lossy().into_owned();
        (dir, path_str)
    }

    fn read_record(path: &str) -> BootRecord {
        let mut journal = Journal::open_or_init(Path::new(path)).expect("open");
        journal.read().expect("read")
    }

    #[test]
    fn init_creates_and_prints() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["init", &path]), 0);
        let rec = read_record(&path);
        assert_eq!(rec.tier, Tier::Minimal);
        assert_eq!(rec.tries_t2, 3);
    }

    #[test]
    fn set_tier_roundtrip() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["set-tier", "2", &path]), 0);
        assert_eq!(read_record(&path).tier, Tier::Connected);
    }

    #[test]
    fn set_tier_rejects_out_of_range() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["set-tier", "4", &path]), 1);
        assert_eq!(cli(&["set-tier", "0", &path]), 1);
    }

    #[test]
    fn dec_tries_saturates() {
        let (_dir, path) = temp_journal();
        for expected in [2, 1, 0, 0] {
            assert_eq!(cli(&["dec-tries", "3", &path]), 0);
            assert_eq!(read_record(&path).tries_t3, expected);
        }
    }

    #[test]
    fn dec_tries_rejects_tier_one() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["dec-tries", "1", &path]), 1);
    }

    #[test]
    fn reset_tries_restores_defaults() {
        let (_dir, path) = temp_journal();
        cli(&["dec-tries", "2", &path]);
        cli(&["dec-tries", "3", &path]);
        assert_eq!(cli(&["reset-tries", &path]), 0);
        let rec = read_record(&path);
        assert_eq!(rec.tries_t2, 3);
        assert_eq!(rec.tries_t3, 3);
    }

    #[test]
    fn flag_lifecycle() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["set-flag", "emergency", &path]), 0);
        assert!(read_record(&path).flags.contains(BootFlags::EMERGENCY));
        assert_eq!(cli(&["clear-flag", "emergency", &path]), 0);
        assert!(!read_record(&path).flags.contains(BootFlags::EMERGENCY));
    }

    #[test]
    fn clear_brownout_also_drops_the_cooldown_counter() {
        let (_dir, path) = temp_journal();
        cli(&["set-flag", "brownout", &path]);
        {
            let mut journal = Journal::open_or_init(Path::new(&path)).expect("open");
            let mut rec = journal.read().expect("read");
            rec.flags = rec.flags.tick_brownout_boots();
            journal.write(&mut rec).expect("write");
        }
        assert_eq!(cli(&["clear-flag", "brownout", &path]), 0);
        let rec = read_record(&path);
        assert!(!rec.flags.contains(BootFlags::BROWNOUT));
        assert_eq!(rec.flags.brownout_boots(), 0);
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["set-flag", "frobnicate", &path]), 1);
    }

    #[test]
    fn inc_boot_advances() {
        let (_dir, path) = temp_journal();
        assert_eq!(cli(&["inc-boot", &path]), 0);
        assert_eq!(cli(&["inc-boot", &path]), 0);
        assert_eq!(read_record(&path).boot_count, 2);
    }

    #[test]
    fn unknown_command_is_usage_error() {
        assert_eq!(cli(&["frobnicate"]), 1);
    }

    #[test]
    fn no_arguments_prints_help_with_usage_exit() {
        assert_eq!(cli(&[]), 1);
    }

    #[test]
    fn unwritable_path_is_io_exit() {
        assert_eq!(cli(&["init", "/nonexistent-root-dir/journal.dat"]), 2);
    }

    #[test]
    fn read_json_exits_clean() {
        let (_dir, path) = temp_journal();
        cli(&["init", &path]);
        assert_eq!(cli(&["read", "--json", &path]), 0);
    }
}
