mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use toolbelt::config::Config;
use toolbelt::{colors, upgrade, TOOL_VERSION};

#[derive(Parser)]
#[command(
    name = "tbx",
    about = "A per-user tool package manager driven by a signed catalog",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a tool, or switch the linked version
    #[command(visible_alias = "install")]
    Add {
        /// Tool name from the catalog
        tool: String,

        /// The tool version to use (defaults to the latest)
        #[arg(short = 'v', long = "version")]
        version: Option<String>,

        /// Overwrite a user-bin entry that was not created by us
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Uninstall a version of a tool, or every version
    #[command(name = "rm", visible_alias = "remove")]
    Remove {
        tool: String,

        /// Remove only this version
        #[arg(short = 'v', long = "version")]
        version: Option<String>,
    },

    /// Remove only the user-bin symlink of a tool
    Unlink { tool: String },

    /// List catalog tools, marking installed ones
    Ls {
        /// Filter by name, topic or regular expression
        pattern: Option<String>,
    },

    /// Show versions, artifacts and installed size of a tool
    Info { tool: String },

    /// Print (or fetch) the help of a tool
    Help { tool: String },

    /// Force-refresh the catalog from its URL
    Update,

    /// Upgrade this tool in place
    Upgrade,

    /// Internal half of the upgrade handoff
    #[command(name = "complete-upgrade", hide = true)]
    CompleteUpgrade { backup: String },

    /// Print the tool version
    Version,
}

fn main() {
    colors::init_colors();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Add {
            tool,
            version,
            force,
        } => {
            let config = Config::default_config()?;
            commands::add::add(&config, &tool, version.as_deref(), force)
        }
        Commands::Remove { tool, version } => {
            let config = Config::default_config()?;
            commands::remove::remove(&config, &tool, version.as_deref())
        }
        Commands::Unlink { tool } => {
            let config = Config::default_config()?;
            commands::unlink::unlink(&config, &tool)
        }
        Commands::Ls { pattern } => {
            let config = Config::default_config()?;
            commands::list::list(&config, pattern.as_deref())
        }
        Commands::Info { tool } => {
            let config = Config::default_config()?;
            commands::info::info(&config, &tool)
        }
        Commands::Help { tool } => {
            let config = Config::default_config()?;
            commands::help::help(&config, &tool)
        }
        Commands::Update => {
            let config = Config::default_config()?;
            commands::update::update(&config)
        }
        Commands::Upgrade => commands::upgrade::upgrade(),
        Commands::CompleteUpgrade { backup } => upgrade::complete_upgrade(&backup),
        Commands::Version => {
            println!("{}", TOOL_VERSION);
            Ok(())
        }
    }
}
