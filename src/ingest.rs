//! Ingestion service.
//!
//! Orchestrates one full run for a profile: search each configured query,
//! fetch the matching messages, run the batch extraction pipeline, reconcile
//! the balance, and persist the artifacts. Runs are sequential and
//! request-scoped; partial success is the normal outcome and the report
//! carries counts rather than an all-or-nothing result.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;

use crate::domain::{EmailRecord, ExtractedRecord, SourceQuery, UserProfile};
use crate::extract::{reconcile_balance, BalanceEstimate};
use crate::pipeline::{run_batch_pipeline, BatchConfig};
use crate::providers::ai::LlmProvider;
use crate::providers::email::{MailProvider, MessageFormat, ProviderError};
use crate::storage::{DumpMetadata, EmailDump, FileStore, RecordDump, StoreError, StoredFileKind};

/// Errors that abort an ingestion run outright.
///
/// Most failures degrade to partial results instead; only authentication and
/// persistence problems surface here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    /// Emails fetched across all queries.
    pub emails_fetched: usize,
    /// Emails that went through a successful model call.
    pub processed_count: usize,
    /// Batches abandoned after exhausting their error budget.
    pub abandoned_batches: usize,
    /// All normalized records, across queries.
    pub records: Vec<ExtractedRecord>,
    /// Most-recent balance estimate for the run.
    pub balance: BalanceEstimate,
    /// Artifact files written during the run.
    pub artifacts: Vec<PathBuf>,
}

/// One full-run orchestrator over caller-owned providers and stores.
pub struct IngestService<'a> {
    mail: &'a dyn MailProvider,
    model: &'a dyn LlmProvider,
    files: &'a FileStore,
    batch_config: BatchConfig,
    list_max_results: u32,
}

impl<'a> IngestService<'a> {
    pub fn new(
        mail: &'a dyn MailProvider,
        model: &'a dyn LlmProvider,
        files: &'a FileStore,
        batch_config: BatchConfig,
        list_max_results: u32,
    ) -> Self {
        Self {
            mail,
            model,
            files,
            batch_config,
            list_max_results,
        }
    }

    /// Runs ingestion for one profile.
    ///
    /// A query whose listing or fetch fails is skipped with a warning;
    /// authentication failures abort the run since every later call would
    /// fail the same way.
    pub async fn run(&self, profile: &UserProfile) -> Result<IngestReport, IngestError> {
        let mut all_emails: Vec<EmailRecord> = Vec::new();
        let mut records: Vec<ExtractedRecord> = Vec::new();
        let mut artifacts: Vec<PathBuf> = Vec::new();
        let mut processed_count = 0;
        let mut abandoned_batches = 0;

        for source in SourceQuery::all() {
            let query = source.expression();
            let mut emails = match self.fetch_query(query).await {
                Ok(emails) => emails,
                Err(error @ ProviderError::Authentication(_)) => return Err(error.into()),
                Err(error) => {
                    tracing::warn!(query, %error, "skipping query");
                    continue;
                }
            };
            if emails.is_empty() {
                continue;
            }
            for email in &mut emails {
                email.account_mapping = Self::map_account(email, profile);
            }

            let dump = EmailDump {
                metadata: DumpMetadata {
                    query: query.to_string(),
                    count: emails.len(),
                    fetched_at: Utc::now().to_rfc3339(),
                },
                emails: emails.clone(),
            };
            artifacts.push(
                self.files
                    .write(StoredFileKind::EnhancedFetch, &dump)
                    .await?,
            );

            let outcome =
                run_batch_pipeline(&emails, profile, self.model, source, &self.batch_config)
                    .await;
            processed_count += outcome.processed_count;
            abandoned_batches += outcome.abandoned_batches;
            records.extend(outcome.records);
            all_emails.extend(emails);
        }

        let balance = reconcile_balance(&all_emails, &records);

        if !records.is_empty() {
            let dump = RecordDump {
                metadata: DumpMetadata {
                    query: "all".to_string(),
                    count: records.len(),
                    fetched_at: Utc::now().to_rfc3339(),
                },
                records: records.clone(),
            };
            artifacts.push(
                self.files
                    .write(StoredFileKind::GeminiTransactions, &dump)
                    .await?,
            );
        }

        tracing::info!(
            emails = all_emails.len(),
            processed = processed_count,
            records = records.len(),
            balance = ?balance.amount,
            "ingestion run complete"
        );

        Ok(IngestReport {
            emails_fetched: all_emails.len(),
            processed_count,
            abandoned_batches,
            records,
            balance,
            artifacts,
        })
    }

    /// Combines every stored record batch into one hub aggregate, deduped by
    /// email id (the newest batch wins).
    pub async fn aggregate_hub(&self) -> Result<PathBuf, IngestError> {
        let mut by_email: HashMap<String, ExtractedRecord> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for entry in self
            .files
            .list(Some(StoredFileKind::GeminiTransactions))
            .await?
        {
            let dump: RecordDump = self.files.read(&entry.filename).await?;
            for record in dump.records {
                let key = record.email_id().0.clone();
                if by_email.insert(key.clone(), record).is_none() {
                    order.push(key);
                }
            }
        }

        let records: Vec<ExtractedRecord> = order
            .into_iter()
            .filter_map(|key| by_email.remove(&key))
            .collect();

        let dump = RecordDump {
            metadata: DumpMetadata {
                query: "aggregate".to_string(),
                count: records.len(),
                fetched_at: Utc::now().to_rfc3339(),
            },
            records,
        };

        let path = self
            .files
            .write(StoredFileKind::TransactionsHub, &dump)
            .await?;
        Ok(path)
    }

    /// Matches an email's sender domain against the profile's bank and card
    /// inventory. The first institution whose name appears in the domain
    /// wins.
    fn map_account(email: &EmailRecord, profile: &UserProfile) -> Option<String> {
        let domain = email.sender_domain()?;
        let name_token = |name: &str| -> Option<String> {
            name.split_whitespace()
                .next()
                .filter(|token| token.len() >= 3)
                .map(str::to_lowercase)
        };

        for account in &profile.bank_accounts {
            if let Some(token) = name_token(&account.bank_name) {
                if domain.contains(&token) {
                    return Some(account.bank_name.clone());
                }
            }
        }
        for card in &profile.credit_cards {
            if let Some(token) = name_token(&card.provider) {
                if domain.contains(&token) {
                    return Some(card.provider.clone());
                }
            }
        }
        None
    }

    /// Lists and fetches one query's messages in full format.
    async fn fetch_query(&self, query: &str) -> Result<Vec<EmailRecord>, ProviderError> {
        let ids = self.mail.list_messages(query, self.list_max_results).await?;

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            match self.mail.fetch_message(&id, MessageFormat::Full).await {
                Ok(email) => emails.push(email),
                Err(error @ ProviderError::Authentication(_)) => return Err(error),
                Err(error) => {
                    tracing::warn!(message_id = %id, %error, "skipping message");
                }
            }
        }
        Ok(emails)
    }
}
