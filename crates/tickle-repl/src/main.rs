//! tickle CLI entry point.
//!
//! Usage:
//!   tickle                     # Interactive REPL
//!   tickle -c <script>         # Evaluate a script string and exit
//!   tickle script.tcl [args]   # Run a script file

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tickle_kernel::interpreter::{make_list, EngineFlags, Interp, InterpConfig};
use tickle_kernel::FileSource;
use tickle_repl::profile::{self, Profile};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            tickle_repl::run(load_profile()?)?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("tickle {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let script = args.get(2).context("-c requires a script argument")?;
            run_script_text(script)
        }

        Some(path) if !path.starts_with('-') => run_script_file(path, &args[2..]),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'tickle --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"tickle v{}

Usage:
  tickle                       Interactive REPL
  tickle -c <script>           Evaluate a script string and exit
  tickle <script.tcl> [args]   Run a script file

Options:
  -c <script>                  Evaluate script string and exit
  -h, --help                   Show this help
  -V, --version                Show version

The REPL reads settings from ~/.ticklerc (name = value lines).

Examples:
  tickle                       # Start interactive REPL
  tickle -c 'puts hello'       # Run one script string
  tickle deploy.tcl prod       # Run a script with arguments
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn script_interp(profile: &Profile) -> Interp {
    let mut flags = EngineFlags::empty();
    if profile.verbose_errors {
        flags |= EngineFlags::VERBOSE_ERRORS;
    }
    if profile.trace_commands {
        flags |= EngineFlags::TRACE_COMMANDS;
    }
    let mut interp = Interp::with_config(InterpConfig {
        flags,
        max_depth: profile.max_depth,
        ..InterpConfig::default()
    });
    interp.sources_mut().push(Box::new(FileSource::new()));
    interp
}

fn load_profile() -> Result<Profile> {
    match profile::default_path() {
        Some(path) => Profile::load(&path),
        None => Ok(Profile::default()),
    }
}

fn report(interp: &mut Interp, source_name: &str, result: Result<String, tickle_kernel::ErrorInfo>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = interp.io().write_error(&format!("{source_name}: {e}"));
            ExitCode::FAILURE
        }
    }
}

/// Evaluate a script string and exit.
fn run_script_text(script: &str) -> Result<ExitCode> {
    let profile = load_profile()?;
    let mut interp = script_interp(&profile);
    let result = interp.eval(script);
    if let Ok(value) = &result {
        if !value.is_empty() {
            println!("{value}");
        }
    }
    Ok(report(&mut interp, "tickle", result))
}

/// Run a script file, exposing `argv0`/`argv`/`argc` to the script.
fn run_script_file(path: &str, args: &[String]) -> Result<ExitCode> {
    let profile = load_profile()?;
    let mut interp = script_interp(&profile);
    interp
        .set_var("argv0", path)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    interp
        .set_var("argv", &make_list(args))
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    interp
        .set_var("argc", &args.len().to_string())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let result = interp.eval_file(path);
    Ok(report(&mut interp, path, result))
}
