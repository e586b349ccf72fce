//! shellmux - run commands one after another in a single local shell
//!
//! Every positional argument is queued as a command on one interactive shell
//! running in a pseudoterminal. Output is streamed to stdout and the tool
//! exits with the status of the last command that failed.

use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use tracing::{debug, error, info};

use shellmux::{describe_error, load_config, LocalPtyTransport, Shell, ShellExt};

/// Command line configuration
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Shell program to start instead of `$SHELL`
    shell: Option<String>,
    /// Enable debug mode
    debug: bool,
    /// Commands to run, in order
    commands: Vec<String>,
}

impl AppArgs {
    /// Parse command line arguments
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    let Some(path) = args.get(i + 1) else {
                        bail!("Missing config file path");
                    };
                    app_args.config_path = Some(PathBuf::from(path));
                    i += 1;
                }
                "--shell" | "-s" => {
                    let Some(shell) = args.get(i + 1) else {
                        bail!("Missing shell program");
                    };
                    app_args.shell = Some(shell.clone());
                    i += 1;
                }
                "--debug" | "-d" => {
                    app_args.debug = true;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("shellmux v{}", shellmux::VERSION);
                    process::exit(0);
                }
                "--" => {
                    app_args.commands.extend(args[i + 1..].iter().cloned());
                    break;
                }
                arg if arg.starts_with('-') => {
                    bail!("Unknown option: {}", arg);
                }
                command => app_args.commands.push(command.to_string()),
            }
            i += 1;
        }

        Ok(app_args)
    }
}

/// Print help information
fn print_help() {
    println!("shellmux - run commands one after another in a single shell");
    println!();
    println!("USAGE:");
    println!("    shellmux [OPTIONS] [--] <COMMAND>...");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -s, --shell <PATH>     Shell to start (default: $SHELL, then /bin/sh)");
    println!("    -d, --debug            Enable debug logging");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    shellmux looks for configuration files in the following order:");
    println!("    1. Path specified with --config");
    println!("    2. $SHELLMUX_CONFIG");
    println!("    3. $XDG_CONFIG_HOME/shellmux/config.toml");
    println!("    4. ~/.config/shellmux/config.toml");
    println!("    5. ~/.shellmux/config.toml");
    println!("    6. ./shellmux.toml");
    println!("    7. Built-in defaults");
    println!();
    println!("ENVIRONMENT:");
    println!("    SHELLMUX_CONFIG        Path to configuration file");
    println!("    SHELLMUX_DEBUG         Enable debug mode (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

fn init_logging(debug: bool) {
    let debug_env = env::var("SHELLMUX_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let log_level = if debug || debug_env { "debug" } else { "warn" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

async fn run(args: AppArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config_path.as_deref())?;
    let transport = match args.shell {
        Some(shell) => LocalPtyTransport::with_shell(shell),
        None => LocalPtyTransport::new(),
    };
    debug!("Using shell {}", transport.shell_path());

    let mut shell: Shell<LocalPtyTransport> = transport.shell_with(config);
    let mut handles = Vec::with_capacity(args.commands.len());
    for command in &args.commands {
        handles.push(shell.execute_default(command.as_str()).await?);
    }
    shell.wait_all().await.context("shell session ended early")?;

    let mut exit_code = 0;
    for handle in &handles {
        let status = handle.exit_status().unwrap_or(shellmux::CHANNEL_CLOSED_STATUS);
        info!("'{}' exited with {}", handle.command(), status);
        if status != 0 {
            exit_code = status;
        }
    }

    shell.close().await?;
    Ok(exit_code)
}

#[tokio::main]
async fn main() {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("shellmux: {}", e);
        print_help();
        process::exit(2);
    });

    init_logging(args.debug);

    if args.commands.is_empty() {
        print_help();
        process::exit(2);
    }

    match run(args).await {
        // Negative statuses (channel closed) are reported as a generic failure
        Ok(code) => process::exit(if code < 0 { 1 } else { code }),
        Err(e) => {
            match e.downcast_ref::<shellmux::Error>() {
                Some(err) => eprintln!("{}", describe_error(err)),
                None => eprintln!("shellmux: {:#}", e),
            }
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
