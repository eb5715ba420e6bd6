//! CLI for skopeo-mirror
//!
//! Provides one subcommand per registry operation:
//! - `version`, `inspect`, `delete`: skopeo image operations
//! - `scan`: trivy vulnerability scan
//! - `mirror-one`, `mirror-many`: `skopeo copy` between registries
//! - `ecr-login`: AWS credentials to ECR password
//! - `health`, `completions`: tooling

pub mod completions;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use skopeo_mirror::executor::ContainerEngine;
use skopeo_mirror::registry::{
    EcrPull, MirrorRequest, RegistryCredentials, ScanFormat, ScanOptions, SecretSource, Severity,
    Skopeo, SkopeoError, SourceAuth, ValidationError,
};
use skopeo_mirror::{CliEngine, Config, ContainerRuntime, init_logging};

/// CLI arguments for skopeo-mirror
#[derive(Parser, Debug)]
#[command(name = "skopeo-mirror")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// Configuration file (defaults to ./skopeo-mirror.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Container runtime
    #[arg(long, global = true, value_enum)]
    runtime: Option<RuntimeArg>,

    /// Tag of quay.io/skopeo/stable
    #[arg(long, global = true)]
    skopeo_image_tag: Option<String>,

    /// Tag of amazon/aws-cli
    #[arg(long, global = true)]
    aws_cli_image_tag: Option<String>,

    /// Named volume for the trivy vulnerability DB
    #[arg(long, global = true)]
    trivy_cache_volume: Option<String>,

    /// Per-container timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct CredentialArgs {
    /// Registry user
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Registry password source: env:NAME or file:PATH
    #[arg(long, requires = "username")]
    password: Option<SecretSource>,
}

#[derive(clap::Args, Debug, Clone)]
struct MirrorArgs {
    /// Source registry
    #[arg(long)]
    src_registry: String,

    /// Destination registry
    #[arg(long)]
    dst_registry: String,

    /// Destination user
    #[arg(long, default_value = "")]
    dst_user: String,

    /// Destination password source: env:NAME or file:PATH
    #[arg(long)]
    dst_pass: Option<SecretSource>,

    /// Destination reference (defaults to the repository tag)
    #[arg(long)]
    dst_ref: Option<String>,

    /// Source user
    #[arg(long, requires = "src_pass", conflicts_with = "aws_pull")]
    src_user: Option<String>,

    /// Source password source: env:NAME or file:PATH
    #[arg(long, requires = "src_user", conflicts_with = "aws_pull")]
    src_pass: Option<SecretSource>,

    /// Pull from ECR using an AWS credentials file
    #[arg(long)]
    aws_pull: bool,

    /// AWS credentials file
    #[arg(long)]
    aws_creds: Option<PathBuf>,

    /// AWS region of the ECR registry
    #[arg(long)]
    aws_region: Option<String>,

    /// Print a JSON report instead of one line per image
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the skopeo version of the configured image
    Version,

    /// Inspect an image in a registry
    Inspect {
        /// Image reference inside the registry, e.g. team/app:1.0
        image_ref: String,
        /// Registry host
        #[arg(long)]
        registry: String,
        /// Go template for skopeo inspect
        #[arg(long, conflicts_with = "json")]
        format: Option<String>,
        /// Print the full inspection as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Delete an image from a registry
    Delete {
        /// Image reference inside the registry
        image_ref: String,
        /// Registry host
        #[arg(long)]
        registry: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Scan an image with trivy
    Scan {
        /// Full image reference
        image_ref: String,
        /// Severities to include
        #[arg(long, default_value = "UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL")]
        severity: String,
        /// Exit code when vulnerabilities are found
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
        /// Report format
        #[arg(long, default_value = "table")]
        format: String,
        /// Tag of aquasec/trivy
        #[arg(long)]
        trivy_image_tag: Option<String>,
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Mirror a single repository tag
    MirrorOne {
        /// Repository tag to copy, e.g. team/app:1.0
        #[arg(long)]
        repo_tag: String,
        #[command(flatten)]
        mirror: MirrorArgs,
    },

    /// Mirror many repository tags in parallel
    MirrorMany {
        /// Repository tags to copy (comma separated or repeated)
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        repo_tags: Vec<String>,
        /// Maximum concurrent copies (0 = all at once)
        #[arg(long)]
        max_parallel: Option<usize>,
        #[command(flatten)]
        mirror: MirrorArgs,
    },

    /// Print an ECR login password
    EcrLogin {
        /// AWS credentials file
        #[arg(long)]
        aws_creds: PathBuf,
        /// AWS region
        #[arg(long)]
        aws_region: String,
    },

    /// Check that the container runtime works
    Health,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long, conflicts_with = "install")]
        output: Option<PathBuf>,
        /// Write to the shell's per-user completion directory
        #[arg(long)]
        install: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RuntimeArg {
    Docker,
    Podman,
}

impl From<RuntimeArg> for ContainerRuntime {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Docker => ContainerRuntime::Docker,
            RuntimeArg::Podman => ContainerRuntime::Podman,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

impl CredentialArgs {
    fn resolve(&self) -> Result<Option<RegistryCredentials>> {
        match (&self.username, &self.password) {
            (Some(user), Some(source)) => Ok(Some(RegistryCredentials::new(
                user.clone(),
                source.resolve()?,
            ))),
            _ => Ok(None),
        }
    }
}

impl MirrorArgs {
    fn source_auth(&self) -> Result<SourceAuth> {
        if self.aws_pull {
            let aws_creds = self
                .aws_creds
                .clone()
                .ok_or(ValidationError::IncompleteEcr("--aws-creds"))?;
            let aws_region = self
                .aws_region
                .clone()
                .ok_or(ValidationError::IncompleteEcr("--aws-region"))?;
            return Ok(SourceAuth::Ecr(EcrPull {
                aws_creds,
                aws_region,
            }));
        }

        let credentials = CredentialArgs {
            username: self.src_user.clone(),
            password: self.src_pass.clone(),
        };
        Ok(credentials
            .resolve()?
            .map_or(SourceAuth::Anonymous, SourceAuth::Credentials))
    }

    fn request(&self) -> Result<MirrorRequest> {
        let dst_pass = self
            .dst_pass
            .as_ref()
            .map(SecretSource::resolve)
            .transpose()
            .context("Failed to resolve --dst-pass")?;

        let mut request = MirrorRequest::new(&self.src_registry, &self.dst_registry)
            .with_destination_credentials(&self.dst_user, dst_pass)
            .with_source_auth(self.source_auth()?);
        if let Some(dst_ref) = &self.dst_ref {
            request = request.with_dst_ref(dst_ref);
        }
        Ok(request)
    }
}

impl GlobalArgs {
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(runtime) = self.runtime {
            config.runtime = runtime.into();
        }
        if let Some(tag) = &self.skopeo_image_tag {
            config.skopeo_image_tag = tag.clone();
        }
        if let Some(tag) = &self.aws_cli_image_tag {
            config.aws_cli_image_tag = tag.clone();
        }
        if let Some(volume) = &self.trivy_cache_volume {
            config.trivy_cache_volume = volume.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = Some(secs);
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    <Args as clap::CommandFactory>::command()
}

/// Parse and execute CLI arguments
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();

    if let Command::Completions {
        shell,
        output,
        install,
    } = args.command
    {
        return write_completions(shell, output, install).map(|()| ExitCode::SUCCESS);
    }

    let config = args.global.config()?;
    init_logging(&config.log_level);
    tracing::debug!(?config, "Resolved configuration");

    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    runtime.block_on(execute(args.command, config))
}

fn write_completions(shell: ShellArg, output: Option<PathBuf>, install: bool) -> Result<()> {
    use clap_complete::Shell;

    let shell_enum = match shell {
        ShellArg::Bash => Shell::Bash,
        ShellArg::Zsh => Shell::Zsh,
        ShellArg::Fish => Shell::Fish,
        ShellArg::PowerShell => Shell::PowerShell,
    };

    let completions = completions::generate_completions(shell_enum)?;

    let output = if install {
        let home = std::env::var_os("HOME").context("HOME environment variable not set")?;
        Some(completions::default_completions_path(
            shell_enum,
            std::path::Path::new(&home),
        )?)
    } else {
        output
    };

    if let Some(output_path) = output {
        completions::save_completions(&completions, &output_path)?;
        eprintln!("Completions written to {}", output_path.display());
    } else {
        println!("{}", completions);
    }
    Ok(())
}

async fn execute(command: Command, config: Config) -> Result<ExitCode> {
    let engine = Arc::new(CliEngine::new(config.runtime).with_timeout(config.timeout()));
    let result = dispatch(command, &config, engine.clone()).await;
    // containers dropped by a failed fan-out are removed before the runtime goes away
    engine.wait_for_cleanup().await;
    result
}

/// Exit code and report when trivy signalled findings through `--exit-code`.
fn scan_findings(err: &SkopeoError, exit_code: i32) -> Option<(u8, &str, &str)> {
    match err {
        SkopeoError::CommandFailed {
            code,
            stdout,
            stderr,
        } if *code == exit_code && exit_code != 0 => {
            Some((u8::try_from(*code).unwrap_or(1), stdout.as_str(), stderr.as_str()))
        }
        _ => None,
    }
}

async fn dispatch(command: Command, config: &Config, engine: Arc<CliEngine>) -> Result<ExitCode> {
    let skopeo = Skopeo::from_config(engine.clone(), config);

    match command {
        Command::Version => {
            print!("{}", skopeo.version().await?);
        }
        Command::Inspect {
            image_ref,
            registry,
            format,
            json,
            credentials,
        } => {
            let credentials = credentials.resolve()?;
            if json {
                let inspection = skopeo
                    .inspect_json(&image_ref, &registry, credentials.as_ref())
                    .await?;
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                let out = skopeo
                    .inspect(&image_ref, &registry, format.as_deref(), credentials.as_ref())
                    .await?;
                print!("{out}");
            }
        }
        Command::Delete {
            image_ref,
            registry,
            credentials,
        } => {
            let credentials = credentials.resolve()?;
            print!(
                "{}",
                skopeo.delete(&image_ref, &registry, credentials.as_ref()).await?
            );
        }
        Command::Scan {
            image_ref,
            severity,
            exit_code,
            format,
            trivy_image_tag,
            credentials,
        } => {
            let options = ScanOptions {
                severity: Severity::parse_list(&severity)?,
                exit_code,
                format: format.parse::<ScanFormat>()?,
                trivy_image_tag: trivy_image_tag.unwrap_or_else(|| config.trivy_image_tag.clone()),
            };
            let credentials = credentials.resolve()?;

            match skopeo.scan_image(&image_ref, &options, credentials.as_ref()).await {
                Ok(report) => print!("{report}"),
                Err(e) => {
                    let Some((code, report, stderr)) = scan_findings(&e, exit_code) else {
                        return Err(e.into());
                    };
                    print!("{report}");
                    eprint!("{stderr}");
                    tracing::warn!(image = %image_ref, code, "Vulnerabilities found");
                    return Ok(ExitCode::from(code));
                }
            }
        }
        Command::MirrorOne { repo_tag, mirror } => {
            let request = mirror.request()?;
            let image = skopeo.mirror_one(&request, &repo_tag).await?;
            if mirror.json {
                println!("{}", serde_json::to_string_pretty(&image)?);
            } else {
                println!("{} -> {}", image.source, image.destination);
            }
        }
        Command::MirrorMany {
            repo_tags,
            max_parallel,
            mirror,
        } => {
            let request = mirror.request()?;
            let skopeo = match max_parallel {
                Some(n) => skopeo.with_max_parallel(n),
                None => skopeo,
            };
            let report = skopeo.mirror_many(&request, &repo_tags).await?;
            if mirror.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for image in &report.images {
                    println!("{} -> {}", image.source, image.destination);
                }
            }
        }
        Command::EcrLogin {
            aws_creds,
            aws_region,
        } => {
            let token = skopeo.ecr_login_password(&aws_creds, &aws_region).await?;
            println!("{}", token.expose_secret());
        }
        Command::Health => {
            let health = engine.health_check().await;
            println!("{}: {}", engine.name(), health);
            if !health.is_operational() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Completions {
            shell,
            output,
            install,
        } => write_completions(shell, output, install)?,
    }

    Ok(ExitCode::SUCCESS)
}
