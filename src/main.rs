use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use staticsite_lib::config::{ProvisionerSettings, SiteConfig, http_timeout};
use staticsite_lib::domain::{derive_zone, matches_zone};
use staticsite_lib::issuance::dns::{DnsLookup, check_record, wait_for_record};
use staticsite_lib::issuance::providers::{
    AcmAuthority, InMemoryAuthority, InMemoryZone, Route53Zone,
};
use staticsite_lib::issuance::{
    CertificateAuthority, CertificateProvisioner, DnsZoneService, RecordType,
};
use staticsite_lib::site::{SiteOutputs, SitePlan};

#[derive(Parser, Debug)]
#[command(name = "staticsite", version, about = "Static website stack with a DNS-validated certificate")]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the site config and print the resources it declares
    Plan {
        #[arg(short, long, env = "STATICSITE_CONFIG")]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = PlanFormat::Json)]
        format: PlanFormat,
    },
    /// Request the site certificate and optionally validate it through the DNS zone
    Certificate {
        #[arg(short, long, env = "STATICSITE_CONFIG")]
        config: PathBuf,
        /// Create validation records and wait for issuance
        #[arg(long)]
        validate: bool,
        /// Use in-process collaborators instead of AWS
        #[arg(long)]
        dry_run: bool,
    },
    /// Look up a validation record on public DNS resolvers
    CheckRecords {
        #[arg(short, long, env = "STATICSITE_CONFIG")]
        config: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: String,
        #[arg(long = "type", default_value = "CNAME")]
        record_type: String,
        /// Keep checking for up to this many seconds
        #[arg(long)]
        wait: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PlanFormat {
    Json,
    Dot,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("staticsite error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Plan { config, format } => plan(load_config(&config)?, format),
        Command::Certificate {
            config,
            validate,
            dry_run,
        } => certificate(load_config(&config)?, validate, dry_run),
        Command::CheckRecords {
            config,
            name,
            value,
            record_type,
            wait,
        } => check_records(load_config(&config)?, name, value, &record_type, wait),
    }
}

fn load_config(path: &Path) -> Result<SiteConfig> {
    let config = SiteConfig::load(path)
        .with_context(|| format!("Failed to load site config {}", path.display()))?;
    info!(
        "[config] loaded {} (zone {}, {} alias(es))",
        config.domain_name,
        config.dns_zone_id,
        config.aliases().len()
    );
    Ok(config)
}

fn plan(config: SiteConfig, format: PlanFormat) -> Result<()> {
    let plan = SitePlan::build(&config, &SiteOutputs::placeholders())
        .context("Failed to build resource graph")?;
    info!(
        "[plan] {} resources in {} apply waves",
        plan.resources.len(),
        plan.apply_waves.len()
    );
    match format {
        PlanFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialise plan")?
        ),
        PlanFormat::Dot => print!("{}", plan.resources.to_dot()),
    }
    Ok(())
}

fn certificate(config: SiteConfig, validate: bool, dry_run: bool) -> Result<()> {
    let settings = ProvisionerSettings::from_env();
    let (authority, zones): (Arc<dyn CertificateAuthority>, Arc<dyn DnsZoneService>) = if dry_run
    {
        let zone = Arc::new(InMemoryZone::new(
            config.dns_zone_id.trim(),
            derive_zone(&config.domain_name),
        ));
        (Arc::new(InMemoryAuthority::observing(zone.clone())), zone)
    } else {
        (
            Arc::new(AcmAuthority::connect(&settings).context("Failed to connect to ACM")?),
            Arc::new(Route53Zone::connect().context("Failed to connect to Route 53")?),
        )
    };

    let provisioner = CertificateProvisioner::new(authority, zones, settings);
    let handle = provisioner.provision(
        &config.domain_name,
        &config.alt_domains(),
        &config.dns_zone_id,
        validate,
    )?;
    println!(
        "{}",
        serde_json::to_string_pretty(&handle).context("Failed to serialise certificate")?
    );
    Ok(())
}

fn check_records(
    config: SiteConfig,
    name: String,
    value: String,
    record_type: &str,
    wait: Option<u64>,
) -> Result<()> {
    let record_type = RecordType::parse(record_type)
        .ok_or_else(|| anyhow!("unsupported record type {record_type}; expected CNAME or TXT"))?;
    let zone = derive_zone(&config.domain_name);
    if !matches_zone(&name, &zone) {
        warn!("[dns-test] {name} is outside the site zone {zone}");
    }

    let lookup = DnsLookup {
        name,
        record_type,
        expected_value: value,
    };
    let timeout = http_timeout(|key| std::env::var(key).ok());
    let result = match wait {
        Some(secs) => wait_for_record(
            &lookup,
            timeout,
            Duration::from_secs(secs),
            ProvisionerSettings::from_env().validation_interval,
        )?,
        None => check_record(&lookup, timeout)?,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialise DNS result")?
    );
    Ok(())
}
