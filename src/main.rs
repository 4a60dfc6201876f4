//! Policy Agent - registry mirror and buyer permission broadcaster

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use policy_agent::{
    config::Args,
    db::{MongoClient, MongoStore},
    logging,
    registry::RegistryClient,
    services::{spawn_registry_sync_task, SellerService},
    signing::Signer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init_tracing(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let domains = args.domain_list();

    info!("======================================");
    info!("  Policy Agent");
    info!("  build {} ({})", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("======================================");
    info!("Registry: {} [{}]", args.registry_url, args.registry_env);
    info!("Domains: {}", domains.join(","));
    info!("Subscriber: {}|{}", args.subscriber_id, args.unique_key_id);
    info!("Signing key: {}", if args.private_key.is_some() { "configured" } else { "MISSING" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("Mock sellers: {}", args.mock_seller_response);
    info!("Broadcast concurrency: {}", args.broadcast_concurrency);
    info!("======================================");

    let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    let store = Arc::new(MongoStore::new(&mongo).await?);

    let registry = Arc::new(RegistryClient::new(
        args.registry_client_config(),
        Signer::new(args.signer_config()),
    )?);
    let sellers = Arc::new(SellerService::new(store, registry));
    let request = args.sync_request();

    if args.run_now {
        info!("Running registry sync once");
        let report = sellers.sync_registry(&request).await?;
        for summary in &report.domains {
            info!(
                domain = %summary.domain,
                new = summary.new_sellers,
                updated = summary.updated_sellers,
                deactivated = summary.deactivated_sellers,
                total = summary.total_sellers_in_registry,
                "Domain summary"
            );
        }
        if !report.failed_domains.is_empty() {
            error!(failed = ?report.failed_domains, "Some domains were not synced");
        }
        return Ok(());
    }

    let task = spawn_registry_sync_task(Arc::clone(&sellers), request, args.sync_interval());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    task.abort();

    Ok(())
}
