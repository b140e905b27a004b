//! finmail - Entry point for the ingestion CLI

use anyhow::{bail, Context};

use finmail::config::Settings;
use finmail::domain::UserId;
use finmail::ingest::IngestService;
use finmail::providers::ai::GeminiProvider;
use finmail::providers::email::{GmailProvider, MailProvider};
use finmail::storage::{FileStore, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting finmail");

    let settings = Settings::load();
    let data_dir = settings.resolved_data_dir();
    let files = FileStore::new(&data_dir);
    let profiles = ProfileStore::new(data_dir.join("profiles"));

    // Profile: explicit id argument, or the only stored profile.
    let profile = match std::env::args().nth(1) {
        Some(user_id) => profiles.get(&UserId::from(user_id)).await?,
        None => {
            let mut all = profiles.list().await?;
            match all.len() {
                0 => bail!("no profiles found; create one under {:?}", profiles.dir()),
                1 => all.remove(0),
                n => bail!("{} profiles found; pass a user id", n),
            }
        }
    };
    tracing::info!(user_id = %profile.user_id, "running for profile");

    let api_key = std::env::var(&settings.ai.api_key_env)
        .with_context(|| format!("{} not set", settings.ai.api_key_env))?;
    let model = GeminiProvider::new(api_key, settings.ai.model.as_str());

    let mut mail = GmailProvider::new(settings.gmail.account.as_str());
    mail.authenticate()
        .await
        .context("Gmail authentication failed")?;

    let service = IngestService::new(
        &mail,
        &model,
        &files,
        settings.pipeline.to_batch_config(),
        settings.gmail.list_max_results,
    );

    let report = service.run(&profile).await?;
    let hub = service.aggregate_hub().await?;

    println!(
        "fetched {} emails, processed {}, extracted {} records ({} batches abandoned)",
        report.emails_fetched,
        report.processed_count,
        report.records.len(),
        report.abandoned_batches,
    );
    match report.balance.amount {
        Some(amount) => println!(
            "latest balance: {:.2} (source: {:?}, as of {})",
            amount,
            report.balance.source,
            report.balance.as_of_date.as_deref().unwrap_or("unknown"),
        ),
        None => println!("no balance found"),
    }
    println!("hub aggregate written to {}", hub.display());

    Ok(())
}
