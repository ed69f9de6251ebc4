mod catalog;
mod config;
mod error;
mod executor;
mod proof_key;
mod report;
mod resources;
mod state;
mod validators;

use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use catalog::filter::filter_cases;
use catalog::parser::parse_catalog_file;
use config::{CliArgs, Command, ValidatorConfig};
use executor::engine::CaseRunner;
use proof_key::ProofKeys;
use resources::ResourceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wopi_validator=info".into()),
        )
        .init();

    let args = CliArgs::parse();

    if let Some(Command::ExportProofKeys) = args.command {
        let keys = ProofKeys::from_paths(
            args.proof_key_file.as_deref(),
            args.old_proof_key_file.as_deref(),
        )?;
        println!("{}", keys.discovery_xml()?);
        return Ok(());
    }

    let config = ValidatorConfig::from_args(args)?;
    info!("Starting wopi-validator v{}", env!("CARGO_PKG_VERSION"));
    info!("Endpoint: {}", config.wopi_endpoint);
    info!("Catalog: {}", config.catalog_path.display());

    let catalog = parse_catalog_file(&config.catalog_path)?;
    catalog.validate()?;

    let catalog_dir = config
        .catalog_path
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let resources = ResourceManager::load(&catalog.resources, catalog_dir)?;
    let proof_keys = ProofKeys::from_paths(
        config.proof_key_file.as_deref(),
        config.old_proof_key_file.as_deref(),
    )?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.token_ttl_secs))
        .build()?;

    let selection = filter_cases(
        &catalog,
        config.test_name.as_deref(),
        config.test_category,
        config.test_group.as_deref(),
    );
    if selection.is_empty() {
        error!("No test cases match the requested filters");
        std::process::exit(1);
    }
    info!("Selected {} test case(s)", selection.len());

    let runner = CaseRunner {
        catalog: &catalog,
        resources: &resources,
        proof_keys: &proof_keys,
        config: &config,
        client: &client,
    };
    let results = runner.run_all(&selection).await;

    let summary = report::summarize(&results);
    report::print_report(&results, &summary);
    std::process::exit(report::exit_code(&summary, config.ignore_skipped));
}
