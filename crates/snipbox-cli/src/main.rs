//! snipbox CLI - Run untrusted Python snippets in isolated worker processes.

mod colors;
mod exec;
mod packages;
mod policy;
mod repl;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snipbox_core::{Sandbox, SandboxConfig};

#[derive(Parser)]
#[command(name = "snipbox")]
#[command(about = "Sandboxed execution of Python snippets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Python interpreter to run workers with
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Package policy file (TOML)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a snippet file once
    Run {
        /// Path to the snippet (.py file)
        file: PathBuf,

        /// Keep bindings in the session namespace (useful with --json)
        #[arg(long)]
        persist: bool,

        /// Timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session with a persistent namespace
    Repl {
        /// Timeout in seconds for each snippet
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Read an execute request as JSON on stdin, write the result as JSON
    Exec,

    /// Inspect the package policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Install a whitelisted package
    Install {
        /// Import name of the package
        name: String,
    },

    /// Uninstall a whitelisted package
    Uninstall {
        /// Import name of the package
        name: String,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Print the resolved policy
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Explain what the policy allows for one name
    Check {
        /// Top-level import name
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format snipbox-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(snipbox_err) = err.downcast_ref::<snipbox_core::Error>() {
            anyhow::anyhow!("{}", snipbox_err.with_hint())
        } else {
            err
        }
    };

    let mut config = SandboxConfig::default();
    if let Some(python) = cli.python {
        config = config.with_python(python);
    }
    if let Some(policy) = cli.policy {
        config = config.with_policy_path(policy);
    }

    let sandbox = || Sandbox::new(config.clone()).map_err(|e| format_error(e.into()));

    match cli.command {
        Commands::Run {
            file,
            persist,
            timeout,
            json,
        } => {
            let succeeded = run::execute(&sandbox()?, &file, persist, timeout, json)?;
            if !succeeded {
                std::process::exit(1);
            }
        }

        Commands::Repl { timeout } => repl::execute(&sandbox()?, timeout)?,

        Commands::Exec => exec::execute(&sandbox()?)?,

        Commands::Policy { action } => match action {
            PolicyAction::Show { json } => policy::show(config.policy_path.as_deref(), json)?,
            PolicyAction::Check { name } => {
                policy::check(config.policy_path.as_deref(), &name);
            }
        },

        Commands::Install { name } => {
            packages::install(&sandbox()?, &name).map_err(format_error)?;
        }

        Commands::Uninstall { name } => {
            packages::uninstall(&sandbox()?, &name).map_err(format_error)?;
        }
    }

    Ok(())
}
