//! keyseed CLI: command-line client for the keyseed secret store.
//!
//! - `init` creates the deployment's Writer and Reader principals.
//! - `provision` runs the idempotent bootstrap with the Writer credential.
//! - `run` resolves the workload's secrets with the Reader credential and
//!   starts a child process with them in its environment.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod client;

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use keyseed_core::access::{Credential, ReaderCredential, WriterCredential};
use keyseed_core::generator::{OsRngGenerator, SecretGenerator};
use keyseed_core::manifest::{DeploymentManifest, ManifestPolicy};
use keyseed_core::provision::{ProvisionOutcome, ProvisioningJob};
use keyseed_core::secret::SecretValue;
use keyseed_core::store::{SecretReader, SecretWriter};

use crate::client::HttpSecretStore;

#[derive(Parser)]
#[command(
    name = "keyseed",
    version,
    about = "keyseed CLI: bootstrap deployment secrets with separate writer and reader identities",
    long_about = None,
    after_help = "Environment variables:\n  \
         KEYSEED_ADDR           Server address (default: http://127.0.0.1:8300)\n  \
         KEYSEED_WRITER_TOKEN   Writer credential for `provision`\n  \
         KEYSEED_READER_TOKEN   Reader credential for `run`\n  \
         KEYSEED_DB_PASSWORD    Supplied value for db-password (standard manifest)\n\n\
         Examples:\n  \
         keyseed init --writer-out writer.cred --reader-out reader.cred\n  \
         KEYSEED_WRITER_TOKEN=$(cat writer.cred) keyseed provision\n  \
         KEYSEED_READER_TOKEN=$(cat reader.cred) keyseed run -- ./server"
)]
struct Cli {
    /// keyseed server address.
    #[arg(long, env = "KEYSEED_ADDR", default_value = "http://127.0.0.1:8300")]
    addr: String,

    /// Request and provisioning time bound, in seconds.
    #[arg(long, env = "KEYSEED_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Disable colored output.
    #[arg(long, default_value = "false")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health, and bindings and secret names when a credential is given.
    Status {
        /// Any principal's credential.
        #[arg(long, env = "KEYSEED_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Create the Writer and Reader principals (once per store).
    Init {
        /// Write the Writer credential to this file (mode 0600, never overwritten).
        #[arg(long)]
        writer_out: Option<PathBuf>,
        /// Write the Reader credential to this file (mode 0600, never overwritten).
        #[arg(long)]
        reader_out: Option<PathBuf>,
    },
    /// Print a fresh 384-bit URL-safe token.
    Generate,
    /// Show the secrets a manifest declares. Values are never printed.
    Manifest {
        /// Manifest file (default: built-in admin-token + db-password).
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Ensure every declared secret exists, never overwriting existing ones.
    Provision {
        /// Manifest file (default: built-in admin-token + db-password).
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Writer credential.
        #[arg(long, env = "KEYSEED_WRITER_TOKEN", hide_env_values = true)]
        writer_token: Option<String>,
    },
    /// Resolve the workload's secrets and run a command with them.
    Run {
        /// Manifest file (default: built-in admin-token + db-password).
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Reader credential.
        #[arg(long, env = "KEYSEED_READER_TOKEN", hide_env_values = true)]
        reader_token: Option<String>,
        /// Command and arguments.
        #[arg(last = true)]
        command: Vec<String>,
    },
}

// ── Output ───────────────────────────────────────────────────────────

struct Printer {
    color: bool,
}

impl Printer {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_owned()
        }
    }

    fn header(&self, title: &str) {
        println!("{}", self.paint("1;36", title));
        println!("{}", self.paint("2", "─────────────────────────────────────────"));
    }

    fn kv_line(&self, key: &str, value: &str) {
        println!("  {} {value}", self.paint("2", &format!("{key:<20}")));
    }

    fn success(&self, msg: &str) {
        println!("{} {msg}", self.paint("1;32", "✓"));
    }

    fn warning(&self, msg: &str) {
        println!("{} {}", self.paint("1;33", "!"), self.paint("33", msg));
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {msg}", self.paint("1;31", "✗ Error:"));
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KEYSEED_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let out = Printer {
        color: !cli.no_color,
    };
    let timeout = Duration::from_secs(cli.timeout);

    match run(&out, &cli.addr, timeout, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            out.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(out: &Printer, addr: &str, timeout: Duration, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Status { token } => {
            cmd_status(out, &HttpSecretStore::new(addr, timeout)?, token.as_deref()).await
        }
        Commands::Init {
            writer_out,
            reader_out,
        } => {
            cmd_init(
                out,
                &HttpSecretStore::new(addr, timeout)?,
                writer_out.as_deref(),
                reader_out.as_deref(),
            )
            .await
        }
        Commands::Generate => cmd_generate(),
        Commands::Manifest { manifest } => cmd_manifest(out, manifest.as_deref()),
        Commands::Provision {
            manifest,
            writer_token,
        } => {
            let store = HttpSecretStore::new(addr, timeout)?;
            cmd_provision(out, store, manifest.as_deref(), writer_token, timeout).await
        }
        Commands::Run {
            manifest,
            reader_token,
            command,
        } => {
            let store = HttpSecretStore::new(addr, timeout)?;
            cmd_run(out, store, manifest.as_deref(), reader_token, &command).await
        }
    }
}

fn load_manifest(path: Option<&Path>) -> Result<DeploymentManifest> {
    match path {
        Some(p) => DeploymentManifest::load(p).context("invalid manifest"),
        None => Ok(DeploymentManifest::standard()),
    }
}

fn parse_credential(raw: Option<String>, env: &str) -> Result<Credential> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        bail!("no credential provided, set {env}");
    };
    Credential::parse(raw.trim()).with_context(|| format!("{env} is not a keyseed credential"))
}

async fn cmd_status(out: &Printer, store: &HttpSecretStore, token: Option<&str>) -> Result<()> {
    let health = store.get_json("/v1/sys/health", None).await?;
    println!();
    out.header("keyseed status");
    out.kv_line("Status", health["status"].as_str().unwrap_or("unknown"));
    out.kv_line(
        "Initialized",
        if health["initialized"].as_bool().unwrap_or(false) {
            "yes"
        } else {
            "no"
        },
    );

    if let Some(token) = token {
        let credential = parse_credential(Some(token.to_owned()), "KEYSEED_TOKEN")?;
        let status = store.get_json("/v1/sys/status", Some(&credential)).await?;
        out.kv_line("Scope", status["scope"].as_str().unwrap_or("-"));
        for binding in status["bindings"].as_array().into_iter().flatten() {
            out.kv_line(
                binding["principal"]["role"].as_str().unwrap_or("?"),
                &format!(
                    "{} {}",
                    binding["principal"]["id"].as_str().unwrap_or("?"),
                    binding["permissions"]
                ),
            );
        }
        let names: Vec<&str> = status["secrets"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        out.kv_line("Secrets", &names.join(", "));
    }
    println!();
    Ok(())
}

async fn cmd_init(
    out: &Printer,
    store: &HttpSecretStore,
    writer_out: Option<&Path>,
    reader_out: Option<&Path>,
) -> Result<()> {
    // Refuse before init so a bad path cannot lose the only copy.
    for path in [writer_out, reader_out].into_iter().flatten() {
        if path.exists() {
            bail!("{} already exists, refusing to overwrite", path.display());
        }
    }

    let resp = store.post_no_auth("/v1/sys/init").await?;
    let writer = SecretValue::new(resp["writer_token"].as_str().unwrap_or_default());
    let reader = SecretValue::new(resp["reader_token"].as_str().unwrap_or_default());
    if writer.is_empty() || reader.is_empty() {
        bail!("server response did not contain credentials");
    }

    println!();
    out.header("keyseed initialized");
    out.kv_line("Scope", resp["scope"].as_str().unwrap_or("-"));
    out.kv_line("Writer", resp["writer_principal"].as_str().unwrap_or("-"));
    out.kv_line("Reader", resp["reader_principal"].as_str().unwrap_or("-"));
    println!();

    for (label, value, path) in [("Writer", &writer, writer_out), ("Reader", &reader, reader_out)] {
        if let Some(path) = path {
            write_credential(path, value)?;
            out.success(&format!("{label} credential written to {}", path.display()));
        } else {
            out.kv_line(&format!("{label} credential"), value.expose());
        }
    }
    println!();
    out.warning("Credentials are shown once. Store them now.");
    println!();
    Ok(())
}

fn write_credential(path: &Path, bearer: &SecretValue) -> Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bearer.expose().as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn cmd_generate() -> Result<()> {
    let token = OsRngGenerator.generate()?;
    println!("{}", token.expose());
    Ok(())
}

fn cmd_manifest(out: &Printer, path: Option<&Path>) -> Result<()> {
    let manifest = load_manifest(path)?;
    println!();
    out.header("Declared secrets");
    for s in manifest.secrets() {
        let policy = match s.policy {
            ManifestPolicy::GenerateIfAbsent => "generate-if-absent".to_owned(),
            ManifestPolicy::SuppliedValue => {
                let channel = s.supplied_from.as_deref().unwrap_or("-");
                let present = std::env::var(channel).is_ok_and(|v| !v.is_empty());
                format!(
                    "supplied-value from {channel} ({})",
                    if present { "set" } else { "not set" }
                )
            }
        };
        let target = s.env.as_deref().map(|e| format!(" -> {e}")).unwrap_or_default();
        out.kv_line(s.name.as_str(), &format!("{policy}{target}"));
    }
    println!();
    Ok(())
}

async fn cmd_provision(
    out: &Printer,
    store: HttpSecretStore,
    manifest: Option<&Path>,
    writer_token: Option<String>,
    timeout: Duration,
) -> Result<()> {
    let manifest = load_manifest(manifest)?;
    let credential = parse_credential(writer_token, "KEYSEED_WRITER_TOKEN")?;
    let writer = SecretWriter::new(Arc::new(store), WriterCredential::new(credential));

    let job = ProvisioningJob::new(manifest.descriptors(|channel| std::env::var(channel).ok()))?;

    println!();
    out.header("Provisioning secrets");
    let report = job
        .run_with_timeout(&writer, &OsRngGenerator, timeout)
        .await?;
    for (name, outcome) in report.iter() {
        match outcome {
            ProvisionOutcome::Created => out.success(&format!("{name} created")),
            ProvisionOutcome::AlreadyExisted => {
                out.kv_line(name.as_str(), "already exists, left unchanged");
            }
        }
    }
    println!();
    out.success(&format!(
        "{} secrets checked, {} created",
        report.len(),
        report.created()
    ));
    println!();
    Ok(())
}

/// Credentials the parent may hold. Neither these nor the manifest's
/// supplied-value channels reach the workload.
const WORKLOAD_SCRUBBED_ENV: [&str; 3] = [
    "KEYSEED_WRITER_TOKEN",
    "KEYSEED_READER_TOKEN",
    "KEYSEED_TOKEN",
];

fn workload_command(program: &str, args: &[String], manifest: &DeploymentManifest) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    for name in WORKLOAD_SCRUBBED_ENV
        .into_iter()
        .chain(manifest.supplied_channels())
    {
        cmd.env_remove(name);
    }
    cmd
}

async fn cmd_run(
    out: &Printer,
    store: HttpSecretStore,
    manifest: Option<&Path>,
    reader_token: Option<String>,
    command: &[String],
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command specified, usage: keyseed run -- ./server");
    };

    let manifest = load_manifest(manifest)?;
    let binding = manifest.workload_binding()?;
    let credential = parse_credential(reader_token, "KEYSEED_READER_TOKEN")?;
    let reader = SecretReader::new(Arc::new(store), ReaderCredential::new(credential));

    let resolved = binding.resolve(&reader).await?;
    for reference in binding.references() {
        out.success(&format!("{} resolved", reference.env_var()));
    }

    let status = workload_command(program, args, &manifest)
        .envs(resolved.exposed())
        .status()
        .with_context(|| format!("failed to execute: {program}"))?;

    if !status.success() {
        let code = status.code().unwrap_or(1);
        bail!("command exited with code {code}");
    }
    Ok(())
}
