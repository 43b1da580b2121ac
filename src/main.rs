//! Thin CLI layer: parse args, styled output, and call into prim-core.
//! Crash-proof: panic caught and reported; all errors return Result.

mod ops;
mod utils;

use std::env;
use std::io::IsTerminal;
use std::path::Path;

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use prim_core::{Context, LimitedPool, PoolConfig, PrimError, SubmitOptions};
use tracing_subscriber::EnvFilter;

use ops::Op;

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim_err(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.dimmed());
    } else {
        eprintln!("{}", msg);
    }
}

fn init_tracing(quiet: bool) {
    let filter = EnvFilter::try_new(utils::default_log_filter(quiet))
        .unwrap_or_else(|_| EnvFilter::new("warn,prim_core=off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Progress on stderr; hidden when quiet or stderr isn't a TTY.
fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    bar
}

/// Run settings: CLI flags over env over .primrc.
struct RunSettings {
    config: PoolConfig,
    quiet: bool,
    strict: bool,
    stats: bool,
}

impl RunSettings {
    fn from_matches(m: &ArgMatches) -> Self {
        let cli = PoolConfig {
            workers: m.get_one::<usize>("workers").copied(),
            non_blocking: m.get_flag("non-blocking").then_some(true),
            timeout_ms: m.get_one::<u64>("timeout-ms").copied(),
        };
        Self {
            config: cli.or(prim_core::load_config(Path::new("."))),
            quiet: m.get_flag("quiet"),
            strict: m.get_flag("strict"),
            stats: m.get_flag("stats"),
        }
    }

    fn context(&self) -> Context {
        match self.config.timeout() {
            Some(timeout) => Context::background().with_timeout(timeout),
            None => Context::background(),
        }
    }

    fn pool(&self) -> Result<LimitedPool, String> {
        self.config
            .build_pool("prim")
            .map_err(|e| format!("Failed to start worker pool: {}", e))
    }

    fn submit_options(&self, op: Op) -> SubmitOptions {
        self.config.submit_options().with_label(op.name())
    }

    /// Cancellation and rejected work always fail the run; element failures
    /// only with --strict.
    fn report(&self, err: Option<PrimError>, pool: &LimitedPool) -> Result<(), String> {
        let stats = pool.stats();
        tracing::debug!(
            submitted = stats.submitted,
            completed = stats.completed,
            rejected = stats.rejected,
            "run finished"
        );
        if self.stats {
            dim_err(
                &serde_json::to_string(&stats).unwrap_or_else(|_| "{}".to_string()),
            );
        }
        let Some(err) = err else {
            return Ok(());
        };
        let element_failure = matches!(
            err,
            PrimError::Transform(_) | PrimError::Panicked { .. }
        );
        if self.strict || !element_failure {
            return Err(err.to_string());
        }
        tracing::debug!(error = %err, "element failures tolerated without --strict");
        if !self.quiet {
            warning(&format!("Some lines failed; last error: {}", err));
        }
        Ok(())
    }
}

fn op_from(m: &ArgMatches) -> Result<Op, String> {
    m.get_one::<String>("op")
        .ok_or_else(|| "Missing op".to_string())?
        .parse()
}

fn cmd_apply(settings: &RunSettings, m: &ArgMatches) -> Result<(), String> {
    let op = op_from(m)?;
    let mut lines = utils::read_lines(m.get_one::<String>("file").map(String::as_str))?;
    let pool = settings.pool()?;
    tracing::debug!(op = op.name(), lines = lines.len(), workers = pool.size(), "apply");
    let bar = progress_bar(lines.len(), settings.quiet);

    let result = prim_core::apply_elementwise(
        &settings.context(),
        &mut lines,
        |_, line: &String| {
            let out = op.run(line);
            bar.inc(1);
            out
        },
        Some(&pool),
        &settings.submit_options(op),
    );
    bar.finish_and_clear();

    for line in &lines {
        println!("{}", line);
    }
    settings.report(result.err(), &pool)
}

fn cmd_map(settings: &RunSettings, m: &ArgMatches) -> Result<(), String> {
    let op = op_from(m)?;
    let lines = utils::read_lines(m.get_one::<String>("file").map(String::as_str))?;
    let pool = settings.pool()?;
    tracing::debug!(op = op.name(), lines = lines.len(), workers = pool.size(), "map");
    let bar = progress_bar(lines.len(), settings.quiet);

    let result = prim_core::map_elementwise(
        &settings.context(),
        &lines,
        |_, line: &String| {
            let out = op.run(line);
            bar.inc(1);
            out
        },
        Some(&pool),
        &settings.submit_options(op),
    );
    bar.finish_and_clear();

    let (results, err) = match result {
        Ok(results) => (results, None),
        Err(e) => {
            let (results, err) = e.into_parts();
            (results, Some(err))
        }
    };
    if m.get_flag("json") {
        println!(
            "{}",
            serde_json::to_string(&results).map_err(|e| format!("Failed to encode JSON: {}", e))?
        );
    } else {
        for line in &results {
            println!("{}", line);
        }
    }
    settings.report(err, &pool)
}

fn cmd_ops() {
    info("Available ops");
    for op in Op::ALL {
        println!("  {:<10} {}", op.name(), op.describe());
    }
}

fn run() -> Result<(), String> {
    let op_arg = Arg::new("op")
        .required(true)
        .value_parser(clap::builder::PossibleValuesParser::new(Op::ALL.map(Op::name)))
        .help("Transform to apply to each line (see `prim ops`)");
    let file_arg = Arg::new("file")
        .required(false)
        .help("Input file, one element per line (default: stdin)");

    let matches = Command::new("prim")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Bhuvan Prakash <bhuvanstark6@gmail.com>")
        .about("Apply a transform to every line on a bounded worker pool")
        .after_help(
            "Examples:\n  prim apply upper names.txt\n  prim map sha256 ids.txt --json\n  cat nums.txt | prim --workers 4 --strict apply int",
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .global(true)
                .value_parser(clap::value_parser!(usize))
                .help("Worker count (default: PRIM_WORKERS, .primrc, else CPU count)"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .global(true)
                .value_parser(clap::value_parser!(u64))
                .help("Stop dispatching after this many milliseconds"),
        )
        .arg(
            Arg::new("non-blocking")
                .long("non-blocking")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Fail instead of waiting when the pool is full"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output; no progress bar"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Exit non-zero if any line fails"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print pool counters as JSON on stderr"),
        )
        .subcommand(
            Command::new("apply")
                .about("Transform lines in place; failed lines are printed unchanged")
                .arg(op_arg.clone())
                .arg(file_arg.clone()),
        )
        .subcommand(
            Command::new("map")
                .about("Map lines to new values; failed lines become empty")
                .arg(op_arg)
                .arg(file_arg)
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print results as a JSON array"),
                ),
        )
        .subcommand(Command::new("ops").about("List available ops"))
        .get_matches();

    let settings = RunSettings::from_matches(&matches);
    init_tracing(settings.quiet);

    match matches.subcommand() {
        Some(("apply", sub_m)) => cmd_apply(&settings, sub_m),
        Some(("map", sub_m)) => cmd_map(&settings, sub_m),
        Some(("ops", _)) => {
            cmd_ops();
            Ok(())
        }
        _ => {
            if use_color() {
                println!("{}", "prim".bright_cyan().bold());
            } else {
                println!("prim: elementwise transforms on a bounded worker pool");
            }
            dim_err("Run `prim --help` for details.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
