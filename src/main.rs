//! DDS-Fixer - command line front end
//!
//! Results go to stdout (plain text, or JSON lines with `--json` for a driving
//! UI); diagnostics go to stderr through `env_logger` (`RUST_LOG=info`).

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use dds_fixer::report::default_log_file_name;
use dds_fixer::{
    survey, FixEvent, FixerConfig, Result, RunOutcome, ShortFilePolicy, Signature, SignatureFixer,
};

#[derive(Parser)]
#[command(author, version, about = "Repairs damaged file signatures (DirectDraw Surface by default)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file (signature, extension, short_files, event_capacity)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Expected signature as hex, e.g. 44445320
    #[arg(long)]
    signature: Option<String>,

    /// Target file extension, e.g. dds
    #[arg(long)]
    extension: Option<String>,

    /// Skip files shorter than the signature instead of aborting
    #[arg(long)]
    skip_short: bool,
}

impl ConfigArgs {
    fn load(&self) -> Result<FixerConfig> {
        let mut config = match &self.config {
            Some(path) => FixerConfig::from_file(path)?,
            None => FixerConfig::default(),
        };
        if let Some(hex) = &self.signature {
            config.signature = Signature::from_hex(hex)?;
        }
        if let Some(extension) = &self.extension {
            config.set_extension(extension)?;
        }
        if self.skip_short {
            config.short_files = ShortFilePolicy::Skip;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Count candidate files and subdirectories
    Count {
        directory: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Check every candidate file and repair broken signatures
    Fix {
        directory: PathBuf,

        /// Emit one JSON event per line
        #[arg(long)]
        json: bool,

        /// Save the fix log when done (default name: DDS-Fixer_<date>.txt)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        save_log: Option<Option<PathBuf>>,

        /// Cancel the run when a line reading `cancel` arrives on stdin
        #[arg(long)]
        listen_stdin: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the effective configuration as JSON
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Serialize)]
struct CountResult {
    directory: PathBuf,
    files: u64,
    sub_directories: u64,
    message: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_event(event: &FixEvent, files_to_analyze: &mut u64) {
    match event {
        FixEvent::Started {
            root,
            files_to_analyze: total,
        } => {
            *files_to_analyze = *total;
            println!("Fixing {} files under {}", total, root.display());
        }
        FixEvent::Analyzed {
            path,
            fixed,
            files_analyzed,
            ..
        } => {
            let status = if *fixed { "fixed" } else { "ok" };
            println!(
                "[{}/{}] {:<5} {}",
                files_analyzed,
                files_to_analyze,
                status,
                path.display()
            );
        }
        FixEvent::Skipped { path, len } => {
            println!("skipped ({} bytes) {}", len, path.display());
        }
        FixEvent::DeniedAccess { path } => {
            eprintln!(
                "Denied access to modify {}. Restart with elevated privileges.",
                path.display()
            );
        }
        FixEvent::Failed { .. } => {}
        FixEvent::Finished {
            outcome,
            files_analyzed,
            files_fixed,
        } => {
            if *outcome == RunOutcome::Cancelled {
                println!("Cancelled.");
            }
            println!(
                "{} files analyzed. {} files fixed.",
                files_analyzed, files_fixed
            );
        }
    }
}

fn listen_for_cancel(fixer: &SignatureFixer) {
    let handle = fixer.cancel_handle();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("cancel") => {
                    info!("Cancel requested on stdin");
                    handle.cancel();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

fn count(directory: &Path, config: &FixerConfig) -> Result<i32> {
    let found = survey(directory, config)?;
    print_json(&CountResult {
        directory: directory.to_path_buf(),
        files: found.files,
        sub_directories: found.sub_directories,
        message: found.message(),
    })?;
    Ok(0)
}

fn fix(
    directory: &Path,
    config: FixerConfig,
    json: bool,
    save_log: Option<Option<PathBuf>>,
    listen_stdin: bool,
) -> Result<i32> {
    let mut fixer = SignatureFixer::new(config);
    let events = fixer.start(directory)?;
    if listen_stdin {
        listen_for_cancel(&fixer);
    }

    let mut files_to_analyze = 0;
    for event in events {
        if json {
            print_json(&event)?;
        } else {
            print_event(&event, &mut files_to_analyze);
        }
    }

    let summary = match fixer.wait()? {
        Some(summary) => summary,
        None => return Ok(1),
    };

    if let Some(destination) = save_log {
        let destination = destination
            .unwrap_or_else(|| PathBuf::from(default_log_file_name(chrono::Local::now())));
        fixer.save_log(&destination)?;
        if !json {
            println!("Fix log saved to {}", destination.display());
        }
    }

    Ok(match summary.outcome {
        RunOutcome::Completed | RunOutcome::Cancelled => 0,
        RunOutcome::DeniedAccess | RunOutcome::Failed => 1,
    })
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Count { directory, config } => count(&directory, &config.load()?),
        Commands::Fix {
            directory,
            json,
            save_log,
            listen_stdin,
            config,
        } => fix(&directory, config.load()?, json, save_log, listen_stdin),
        Commands::ShowConfig { config } => {
            println!("{}", serde_json::to_string_pretty(&config.load()?)?);
            Ok(0)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            let mut message = e.to_string();
            if e.is_permission_denied() {
                message.push_str(". Run with elevated privileges.");
            }
            eprintln!("{}", serde_json::json!({ "success": false, "error": message }));
            std::process::exit(1);
        }
    }
}
