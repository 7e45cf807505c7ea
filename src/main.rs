use anyhow::Result;
use clap::{Parser, Subcommand};
use hexprov::{
    cache::Cache,
    check::{check_packages, CheckRequest},
    codec,
    config::Config,
    lockfile::Lockfile,
    model::{Audit, Package},
    output::{format_report_to_string, print_report, OutputFormat},
    registry::HexRegistry,
    sign::{self, Keystore},
    status::Status,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const UNRESOLVED: u8 = 11;
    pub const CORRUPT: u8 = 12;
}

#[derive(Parser)]
#[command(name = "hexprov")]
#[command(
    author,
    version,
    about = "Verify Hex package artifacts against their source repositories"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that published artifacts match their source repositories
    Check {
        /// Packages to check, as NAME or NAME@VERSION
        #[arg(required = true)]
        packages: Vec<String>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Path of the absolution lockfile
        #[arg(long)]
        lockfile: Option<PathBuf>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<String>,

        /// Clear the registry cache before checking
        #[arg(long)]
        clear_cache: bool,

        /// Disable concurrent checking (check packages sequentially)
        #[arg(long)]
        no_parallel: bool,
    },

    /// Record a local absolution for a known artifact mismatch
    Absolve {
        /// Package name
        name: String,

        /// Artifact content hash the absolution applies to
        checksum: String,

        /// Why the mismatch is acceptable
        message: String,

        /// Path of the absolution lockfile
        #[arg(long)]
        lockfile: Option<PathBuf>,
    },

    /// Create, inspect, and verify signed audit records
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Generate the local signing key and trust its public half
    Keygen,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the registry cache
    ClearCache,
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Build, sign, and write an audit record
    Create {
        /// Package name
        name: String,

        /// Package version
        version: String,

        /// Verdict (dangerous, suspicious, lgtm, safe)
        #[arg(long)]
        verdict: Option<String>,

        /// Free-text review notes
        #[arg(long)]
        message: Option<String>,

        /// Mark this as the package author's own attestation
        #[arg(long)]
        author: bool,

        /// Ecosystem identifier (defaults to hexpm)
        #[arg(long)]
        ecosystem: Option<String>,

        /// Where to write the signed audit
        #[arg(long)]
        out: PathBuf,
    },

    /// Decode and display a signed audit
    Show {
        /// Signed audit file
        file: PathBuf,
    },

    /// Verify a signed audit against the trusted keys
    Verify {
        /// Signed audit file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    match cli.command {
        Commands::Check {
            packages,
            format,
            lockfile,
            output,
            clear_cache,
            no_parallel,
        } => {
            if clear_cache {
                Cache::new().clear()?;
            }

            let format_str = format.unwrap_or(config.default_format.clone());
            let lockfile_path = lockfile.unwrap_or(config.lockfile.clone());
            let parallel = !no_parallel && config.parallel;

            run_check(&config, packages, format_str, lockfile_path, output, parallel).await
        }
        Commands::Absolve {
            name,
            checksum,
            message,
            lockfile,
        } => {
            let path = lockfile.unwrap_or(config.lockfile.clone());
            let mut lockfile = Lockfile::load(&path)?;
            lockfile.absolve(&name, &checksum, &message);
            lockfile.save()?;
            println!("Absolved {} ({}) in {}", name, checksum, path.display());
            Ok(exit_codes::SUCCESS)
        }
        Commands::Audit { command } => {
            handle_audit(command)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Keygen => {
            let fingerprint = Keystore::new().generate()?;
            println!("Generated signing key.");
            println!("Fingerprint: {}", fingerprint);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            Cache::new().clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_check(
    config: &Config,
    packages: Vec<String>,
    format: String,
    lockfile_path: PathBuf,
    output_file: Option<String>,
    parallel: bool,
) -> Result<u8> {
    let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    let requests = packages
        .iter()
        .map(|spec| spec.parse::<CheckRequest>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;

    let lockfile = Lockfile::load(&lockfile_path)?;
    let registry = HexRegistry::with_urls(
        config.registry_api_url.clone(),
        config.registry_repo_url.clone(),
    );

    let report = check_packages(&registry, &lockfile, &requests, parallel, is_interactive).await?;

    if let Some(path) = output_file {
        let content = format_report_to_string(&report, format)?;
        std::fs::write(&path, content)?;
        println!("Results written to: {}", path);
    } else {
        print_report(&report, format)?;
    }

    Ok(determine_exit_code(&report))
}

/// Worst status wins across packages: corrupt > unresolved > clean.
fn determine_exit_code(report: &hexprov::model::CheckReport) -> u8 {
    let any = |status: Status| report.results.iter().any(|r| Status::of(r) == status);

    if any(Status::Corrupt) {
        exit_codes::CORRUPT
    } else if any(Status::Unresolved) {
        exit_codes::UNRESOLVED
    } else {
        exit_codes::SUCCESS
    }
}

fn handle_audit(command: AuditCommands) -> Result<()> {
    match command {
        AuditCommands::Create {
            name,
            version,
            verdict,
            message,
            author,
            ecosystem,
            out,
        } => {
            let keystore = Keystore::new();
            let signing_key = keystore.signing_key()?;
            let fingerprint = sign::fingerprint(&signing_key.verifying_key());

            let mut package = Package::new(name, version);
            if let Some(ecosystem) = ecosystem {
                package = package.with_ecosystem(ecosystem);
            }

            let created_at = chrono::Utc::now().timestamp() as u64;
            let mut audit = Audit::new(package, fingerprint, created_at).by_author(author);
            if let Some(verdict) = verdict {
                audit = audit.with_verdict(verdict.parse().map_err(|e: String| anyhow::anyhow!(e))?);
            }
            if let Some(message) = message {
                audit = audit.with_message(message);
            }

            let signed = sign::sign_audit(audit, &signing_key);
            std::fs::write(&out, codec::encode_signed_audit(&signed))?;
            println!("Wrote signed audit to {}", out.display());
            Ok(())
        }
        AuditCommands::Show { file } => {
            let bytes = std::fs::read(&file)?;
            let signed = codec::decode_signed_audit(&bytes)?;
            let audit = &signed.audit;
            let package = audit.package.clone().with_default_ecosystem();

            println!("Package:     {} {}", package.name, package.version);
            println!("Ecosystem:   {}", package.ecosystem_or_default());
            println!(
                "Verdict:     {}",
                audit
                    .verdict
                    .as_present()
                    .map(|v| v.as_str())
                    .unwrap_or("(no opinion)")
            );
            println!(
                "Message:     {}",
                audit.message.as_present().map(String::as_str).unwrap_or("-")
            );
            println!("Fingerprint: {}", audit.public_key_fingerprint);
            println!("Created at:  {}", format_timestamp(audit.created_at));
            println!(
                "By author:   {}",
                if audit.audited_by_author { "yes" } else { "no" }
            );
            Ok(())
        }
        AuditCommands::Verify { file } => {
            let bytes = std::fs::read(&file)?;
            let signed = codec::decode_signed_audit(&bytes)?;
            let trusted = Keystore::new().trusted_keys()?;
            sign::verify_audit(&signed, &trusted)?;
            println!(
                "Signature valid (fingerprint {})",
                signed.audit.public_key_fingerprint
            );
            Ok(())
        }
    }
}

fn format_timestamp(seconds: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(seconds as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'hexprov config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
