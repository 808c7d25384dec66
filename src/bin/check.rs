//! dnsfilter-check: CLI tool for checking hosts against rule lists.

use clap::{Parser, Subcommand};
use dnsfilter::manager::build_engine;
use dnsfilter::{Config, DnsFilter, Filter, RecordType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dnsfilter-check")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Check DNS queries against filtering rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the filtering decision for each host as JSON
    Check {
        /// Hosts to check
        #[arg(required = true)]
        hosts: Vec<String>,

        /// YAML filtering config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Block list file, may be repeated
        #[arg(short, long)]
        block: Vec<PathBuf>,

        /// Allow list file, may be repeated
        #[arg(short, long)]
        allow: Vec<PathBuf>,

        /// Query type (A, AAAA, CNAME, ...)
        #[arg(short, long, default_value = "A")]
        qtype: String,

        /// Client tag, may be repeated
        #[arg(long)]
        ctag: Vec<String>,

        /// Only consult the block lists
        #[arg(long)]
        rules_only: bool,
    },

    /// Parse rule list files and report rule counts
    Validate {
        /// Rule list files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            hosts,
            config,
            block,
            allow,
            qtype,
            ctag,
            rules_only,
        } => check_hosts(&hosts, config, block, allow, &qtype, ctag, rules_only),
        Commands::Validate { files } => validate_files(&files),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// File filters get IDs from 1, in order: block lists first, then allow lists.
fn file_filters(paths: Vec<PathBuf>, first_id: i64) -> Vec<Filter> {
    paths
        .into_iter()
        .zip(first_id..)
        .map(|(path, id)| Filter::file(id, path))
        .collect()
}

fn check_hosts(
    hosts: &[String],
    config: Option<PathBuf>,
    block: Vec<PathBuf>,
    allow: Vec<PathBuf>,
    qtype: &str,
    ctag: Vec<String>,
    rules_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let qtype = RecordType::parse(qtype).ok_or_else(|| format!("unknown query type: {}", qtype))?;

    let config = match config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    let block_count = block.len() as i64;
    let block = file_filters(block, 1);
    let allow = file_filters(allow, block_count + 1);

    let filter = DnsFilter::new(config);
    filter.set_filters(block, allow, false)?;

    let mut settings = filter.request_settings();
    settings.filtering_enabled = true;
    settings.client_tags = ctag;

    for host in hosts {
        let res = if rules_only {
            filter.check_host_rules(host, qtype, &settings)?
        } else {
            filter.check_host(host, qtype, &settings)?
        };
        println!("{}\t{}", host, serde_json::to_string(&res)?);
    }

    filter.close();
    Ok(())
}

fn validate_files(files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let mut failed = 0;
    for (path, id) in files.iter().zip(1i64..) {
        if !path.exists() {
            println!("{}: missing", path.display());
            failed += 1;
            continue;
        }
        match build_engine(&[Filter::file(id, path)]) {
            Ok(engine) => println!(
                "{}: {} network rules, {} host rules",
                path.display(),
                engine.engine().network_rule_count(),
                engine.engine().host_rule_count()
            ),
            Err(e) => {
                println!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} lists failed", failed, files.len()).into());
    }
    Ok(())
}
