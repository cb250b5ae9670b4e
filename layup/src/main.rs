use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;
mod format;

/// Layup - Daemonless Container Image Builder
///
/// Adds local files as a new layer on top of a base image, replaces its
/// environment and command, and pushes the result to a registry.
#[derive(Parser, Debug)]
#[command(name = "layup")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: $XDG_CONFIG_HOME/layup/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Control colored output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    color: String,

    /// Base image reference
    #[arg(short, long, required = true)]
    base: Option<String>,

    /// Destination image reference
    #[arg(short, long, required = true)]
    target: Option<String>,

    /// File or directory to add to the new layer (repeatable)
    #[arg(short, long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Environment variable for the image, KEY=VALUE (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Command the image runs, kept as a single argument
    #[arg(short, long, default_value = "")]
    cmd: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display version information
    Version,
}

fn init_logging(verbosity: context::VerbosityLevel) {
    env_logger::Builder::new()
        .filter_level(verbosity.log_filter())
        .parse_default_env()
        .init();
}

fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        commands::version::print_version();
        return;
    }

    let verbosity = context::VerbosityLevel::from_count(cli.verbose);
    init_logging(verbosity);

    let (Some(base), Some(target)) = (cli.base, cli.target) else {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "--base and --target are required",
            )
            .exit();
    };

    // Build context with precedence: defaults > config file > env vars > CLI flags
    let color = context::ColorChoice::from(cli.color.as_str());
    let ctx = match context::AppContext::build(cli.config.as_deref(), color, verbosity) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let args = commands::build::BuildArgs {
        base,
        target,
        files: cli.files,
        env: cli.env,
        cmd: cli.cmd,
    };
    commands::build::handle_build(&ctx, &args);
}
