#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::lifecycle::LifecycleOp;
use output::{OutputMode, resolve_output_mode};
use perks_core::config;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "perks: apply, revoke, and claim expiring rewards",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, `FORMAT`, and the user config.
    fn output_mode(&self, user_output: Option<&str>) -> OutputMode {
        resolve_output_mode(self.format, self.json, user_output)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a perks project",
        long_about = "Create .perks/ with a default config.toml and an empty, migrated store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    perks init\n\n    # Rewrite the config of an existing project\n    perks init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Records",
        about = "Manage users",
        after_help = "EXAMPLES:\n    perks user create --name Ada --email ada@example.com --dob 1990-04-01\n    perks user find ada@example.com --fields id,rewards --resolve\n    perks user search email example.com --json"
    )]
    User(cmd::user::UserArgs),

    #[command(
        next_help_heading = "Records",
        about = "Manage the reward catalog",
        after_help = "EXAMPLES:\n    perks reward create --name Welcome --expires 2030-01-01T00:00:00Z\n    perks reward find Welcome --fields id,expires\n    perks reward delete 3"
    )]
    Reward(cmd::reward::RewardArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Apply a reward to a user",
        after_help = "EXAMPLES:\n    perks apply 3 ada@example.com\n    perks apply 3 42 --json"
    )]
    Apply(cmd::lifecycle::LifecycleArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Revoke an applied, unclaimed reward",
        after_help = "EXAMPLES:\n    perks revoke 3 ada@example.com"
    )]
    Revoke(cmd::lifecycle::LifecycleArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Claim an applied reward before it expires",
        after_help = "EXAMPLES:\n    perks claim 3 ada@example.com"
    )]
    Claim(cmd::lifecycle::LifecycleArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    perks completions bash > /etc/bash_completion.d/perks"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PERKS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "perks=debug,info"
        } else {
            "perks=info,warn"
        })
    });

    let format = env::var("PERKS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let user_config = config::load_user_config().unwrap_or_else(|err| {
        warn!(error = %err, "ignoring unreadable user config");
        config::UserConfig::default()
    });

    let project_root = std::env::current_dir()?;
    let output = cli.output_mode(user_config.output.as_deref());

    if cli.verbose {
        info!(?output, json = output.is_json(), "resolved output mode");
    }

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::User(ref args) => cmd::user::run_user(args, output, &project_root),
        Commands::Reward(ref args) => cmd::reward::run_reward(args, output, &project_root),
        Commands::Apply(ref args) => {
            cmd::lifecycle::run_lifecycle(LifecycleOp::Apply, args, output, &project_root)
        }
        Commands::Revoke(ref args) => {
            cmd::lifecycle::run_lifecycle(LifecycleOp::Revoke, args, output, &project_root)
        }
        Commands::Claim(ref args) => {
            cmd::lifecycle::run_lifecycle(LifecycleOp::Claim, args, output, &project_root)
        }
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
