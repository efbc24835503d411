#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use aimms_sessions::config::Config;
use aimms_sessions::media::{self, DependencyStatus};
use aimms_sessions::sessions;
use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Operator tool for the AIMMS session service.
#[derive(Parser, Debug)]
#[command(name = "aimms-sessions")]
#[command(version)]
#[command(about = "Session store settings and media dependency checks.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show effective configuration and session store settings
    Status,

    /// Check media dependencies (ffmpeg)
    #[command(long_about = "\
Check media dependencies.

Runs `ffmpeg -version` using the configured path, parses the reported \
version, and compares it with media.min_ffmpeg_version. Exits with an \
error when media.require_ffmpeg is set and the check fails.

Examples:
  aimms-sessions doctor
  AIMMS_FFMPEG_PATH=/opt/ffmpeg/bin/ffmpeg aimms-sessions doctor")]
    Doctor,

    /// Manage configuration
    #[command(long_about = "\
Inspect configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  aimms-sessions config schema
  aimms-sessions config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `aimms-sessions`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(aimms-sessions completions bash)
  aimms-sessions completions zsh > ~/.zfunc/_aimms-sessions")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("AIMMS_CONFIG_DIR", config_dir);
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Status => {
            let store = sessions::create_session_store(&config.sessions);
            print_status(&config, store.name());
            Ok(())
        }

        Commands::Doctor => {
            let runner = media::create_command_runner();
            let report = media::check_dependencies(runner.as_ref(), &config.media).await;
            for status in &report {
                println!("{}", format_dependency(status));
            }
            let failed: Vec<&str> = report
                .iter()
                .filter(|s| !s.is_ok())
                .map(|s| s.name.as_str())
                .collect();
            if config.media.require_ffmpeg && !failed.is_empty() {
                bail!("required media dependencies failed: {}", failed.join(", "));
            }
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Schema => {
                let schema = schemars::schema_for!(Config);
                println!("{}", serde_json::to_string_pretty(&schema)?);
                Ok(())
            }
        },
    }
}

fn print_status(config: &Config, store_name: &str) {
    println!("AIMMS Sessions Status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();
    println!("Sessions:");
    println!("  Store:             {store_name}");
    println!("  TTL:               {}", describe_secs(config.sessions.ttl_secs));
    println!(
        "  Max sessions:      {}",
        if config.sessions.max_sessions == 0 {
            "unbounded".to_string()
        } else {
            config.sessions.max_sessions.to_string()
        }
    );
    println!("  Overflow policy:   {}", config.sessions.overflow);
    println!(
        "  Sweep interval:    {}",
        describe_secs(config.sessions.sweep_interval_secs)
    );
    println!();
    println!("Media:");
    println!("  ffmpeg:            {}", config.media.resolved_ffmpeg_path());
    println!(
        "  Minimum version:   {}",
        if config.media.min_ffmpeg_version.trim().is_empty() {
            "(any)"
        } else {
            config.media.min_ffmpeg_version.as_str()
        }
    );
    println!("  Command timeout:   {}s", config.media.command_timeout_secs);
    println!("  Required:          {}", config.media.require_ffmpeg);
}

fn describe_secs(secs: u64) -> String {
    if secs == 0 {
        "disabled".to_string()
    } else {
        format!("{secs}s")
    }
}

fn format_dependency(status: &DependencyStatus) -> String {
    let marker = if status.is_ok() { "ok  " } else { "FAIL" };
    let version = status
        .version
        .map_or_else(|| "unknown".to_string(), |v| v.to_string());
    let mut line = if status.installed {
        format!("[{marker}] {} {version}", status.name)
    } else {
        format!("[{marker}] {} (not installed)", status.name)
    };
    if let Some(detail) = &status.detail {
        line.push_str(": ");
        line.push_str(detail);
    }
    line
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
