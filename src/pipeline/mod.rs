//! Batch processing loop.
//!
//! Runs the email batches through the model with bounded resilience: rate
//! limits and service unavailability are retried on linear backoff schedules,
//! anything else abandons the batch. One failed batch never aborts the run;
//! the pipeline always returns whatever records were accumulated plus the
//! count of emails actually processed.

use std::time::Duration;

use crate::domain::{EmailRecord, ExtractedRecord, SourceQuery, UserProfile};
use crate::extract::{build_prompt, normalize_response, EXTRACTION_SYSTEM_PROMPT, MAX_BATCH_SIZE};
use crate::providers::ai::{CompletionRequest, LlmError, LlmProvider, Message};

/// Tuning knobs for the batch loop.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Emails per model call. Clamped to [`MAX_BATCH_SIZE`].
    pub batch_size: usize,
    /// Maximum retries per batch across both transient error classes.
    pub max_retries: u32,
    /// Base delay for the rate-limit backoff schedule.
    pub rate_limit_base: Duration,
    /// Base delay for the service-unavailable backoff schedule.
    pub unavailable_base: Duration,
    /// Ceiling for either backoff schedule.
    pub backoff_cap: Duration,
    /// Fixed throttling delay between batches.
    pub inter_batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            max_retries: 3,
            rate_limit_base: Duration::from_secs(5),
            unavailable_base: Duration::from_secs(3),
            backoff_cap: Duration::from_secs(60),
            inter_batch_delay: Duration::from_secs(2),
        }
    }
}

/// What the whole run produced.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Records accumulated from every batch that succeeded.
    pub records: Vec<ExtractedRecord>,
    /// Number of emails that went through a successful model call.
    pub processed_count: usize,
    /// Number of batches abandoned after exhausting their error budget.
    pub abandoned_batches: usize,
}

/// Per-batch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    Abandoned,
}

/// Typed classification of a model-call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    /// Rate-limit signal; retry on the rate-limit schedule.
    RateLimit,
    /// Service-unavailable signal; retry on its own schedule.
    Unavailable,
    /// Everything else; the batch is abandoned immediately.
    Fatal,
}

fn classify(error: &LlmError) -> ErrorClass {
    match error {
        LlmError::RateLimited { .. } => ErrorClass::RateLimit,
        LlmError::Unavailable(_) => ErrorClass::Unavailable,
        LlmError::ApiError { status: 429, .. } => ErrorClass::RateLimit,
        LlmError::ApiError { status: 503, .. } => ErrorClass::Unavailable,
        _ => ErrorClass::Fatal,
    }
}

/// Linear backoff: attempt number times the base, capped.
fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    base.saturating_mul(attempt).min(cap)
}

/// Runs the full batch pipeline over `emails`.
///
/// Chunks the emails, prompts the model once per chunk, normalizes each
/// response, and accumulates the results. Terminal batch states are never
/// surfaced as errors.
pub async fn run_batch_pipeline(
    emails: &[EmailRecord],
    profile: &UserProfile,
    model: &dyn LlmProvider,
    source: SourceQuery,
    config: &BatchConfig,
) -> PipelineOutcome {
    let batch_size = config.batch_size.clamp(1, MAX_BATCH_SIZE);
    let mut outcome = PipelineOutcome::default();
    let batch_count = emails.len().div_ceil(batch_size);

    for (batch_index, batch) in emails.chunks(batch_size).enumerate() {
        let mut state = BatchState::Pending;
        let mut retries = 0u32;

        let prompt = build_prompt(batch, profile);
        let request = CompletionRequest::new(vec![Message::user(prompt)])
            .with_system_prompt(EXTRACTION_SYSTEM_PROMPT)
            .with_max_tokens(4096);

        while state != BatchState::Succeeded && state != BatchState::Abandoned {
            state = BatchState::InFlight;

            match model.complete(&request).await {
                Ok(response) => {
                    let records = normalize_response(&response.text, batch, profile, source);
                    tracing::info!(
                        batch = batch_index + 1,
                        of = batch_count,
                        emails = batch.len(),
                        records = records.len(),
                        "batch succeeded"
                    );
                    outcome.records.extend(records);
                    outcome.processed_count += batch.len();
                    state = BatchState::Succeeded;
                }
                Err(error) => match classify(&error) {
                    ErrorClass::RateLimit if retries < config.max_retries => {
                        retries += 1;
                        let delay =
                            backoff_delay(config.rate_limit_base, retries, config.backoff_cap);
                        tracing::warn!(
                            batch = batch_index + 1,
                            retry = retries,
                            delay_ms = delay.as_millis() as u64,
                            "rate limited, backing off"
                        );
                        state = BatchState::Retrying;
                        tokio::time::sleep(delay).await;
                    }
                    ErrorClass::Unavailable if retries < config.max_retries => {
                        retries += 1;
                        let delay =
                            backoff_delay(config.unavailable_base, retries, config.backoff_cap);
                        tracing::warn!(
                            batch = batch_index + 1,
                            retry = retries,
                            delay_ms = delay.as_millis() as u64,
                            "service unavailable, backing off"
                        );
                        state = BatchState::Retrying;
                        tokio::time::sleep(delay).await;
                    }
                    _ => {
                        tracing::warn!(
                            batch = batch_index + 1,
                            %error,
                            retries,
                            "abandoning batch"
                        );
                        outcome.abandoned_batches += 1;
                        state = BatchState::Abandoned;
                    }
                },
            }
        }

        if batch_index + 1 < batch_count {
            tokio::time::sleep(config.inter_batch_delay).await;
        }
    }

    tracing::info!(
        processed = outcome.processed_count,
        records = outcome.records.len(),
        abandoned = outcome.abandoned_batches,
        "pipeline run complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailId, Identifiers, UserId};
    use crate::providers::ai::{CompletionResponse, FinishReason, LlmResult, TokenUsage};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Scripted model: pops one canned result per call.
    struct ScriptedModel {
        script: Mutex<VecDeque<LlmResult<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(script: Vec<LlmResult<String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        async fn calls(&self) -> u32 {
            *self.calls.lock().await
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-v0"
        }

        async fn complete(&self, _request: &CompletionRequest) -> LlmResult<CompletionResponse> {
            *self.calls.lock().await += 1;
            let next = self
                .script
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok("[]".to_string()));
            next.map(|text| CompletionResponse {
                text,
                tokens_used: TokenUsage::default(),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn email(id: &str) -> EmailRecord {
        EmailRecord {
            id: EmailId::from(id),
            from_address: "alerts@bank.com".to_string(),
            subject: "Alert".to_string(),
            date_header: "Fri, 5 Jan 2024 10:00:00 +0530".to_string(),
            snippet: Some("Rs. 100 debited".to_string()),
            full_body: None,
            pdf_attachments: vec![],
            account_mapping: None,
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            user_id: UserId::from("user-1"),
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            email: "asha@example.com".to_string(),
            bank_accounts: vec![],
            credit_cards: vec![],
            identifiers: Identifiers::default(),
        }
    }

    fn fast_config() -> BatchConfig {
        BatchConfig {
            batch_size: 10,
            max_retries: 3,
            rate_limit_base: Duration::ZERO,
            unavailable_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            inter_batch_delay: Duration::ZERO,
        }
    }

    fn rate_limited() -> LlmError {
        LlmError::RateLimited {
            retry_after_secs: None,
        }
    }

    #[tokio::test]
    async fn rate_limited_twice_then_success_yields_only_successful_records() {
        let model = ScriptedModel::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok(r#"[{"email_id": "m1", "txn_amount": 100}]"#.to_string()),
        ]);
        let emails = vec![email("m1")];

        let outcome =
            run_batch_pipeline(&emails, &profile(), &model, SourceQuery::TransactionAlerts, &fast_config())
                .await;

        assert_eq!(model.calls().await, 3);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.processed_count, 1);
        assert_eq!(outcome.abandoned_batches, 0);
        assert_eq!(
            outcome.records[0].as_transaction().unwrap().amount,
            100.0
        );
    }

    #[tokio::test]
    async fn fatal_error_abandons_batch_without_retry() {
        let model = ScriptedModel::new(vec![Err(LlmError::InvalidResponse(
            "bad".to_string(),
        ))]);
        let emails = vec![email("m1")];

        let outcome =
            run_batch_pipeline(&emails, &profile(), &model, SourceQuery::TransactionAlerts, &fast_config())
                .await;

        assert_eq!(model.calls().await, 1);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.processed_count, 0);
        assert_eq!(outcome.abandoned_batches, 1);
    }

    #[tokio::test]
    async fn retries_exhausted_abandons_batch() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::Unavailable("down".to_string())),
            Err(LlmError::Unavailable("down".to_string())),
            Err(LlmError::Unavailable("down".to_string())),
            Err(LlmError::Unavailable("down".to_string())),
        ]);
        let emails = vec![email("m1")];

        let outcome =
            run_batch_pipeline(&emails, &profile(), &model, SourceQuery::TransactionAlerts, &fast_config())
                .await;

        // Initial attempt plus max_retries.
        assert_eq!(model.calls().await, 4);
        assert_eq!(outcome.abandoned_batches, 1);
        assert_eq!(outcome.processed_count, 0);
    }

    #[tokio::test]
    async fn failed_batch_does_not_abort_later_batches() {
        // 12 emails with batch size 10: two batches. First fails fatally,
        // second succeeds.
        let model = ScriptedModel::new(vec![
            Err(LlmError::ApiError {
                status: 500,
                message: "boom".to_string(),
            }),
            Ok(r#"[{"email_id": "m11", "txn_amount": 11}]"#.to_string()),
        ]);
        let emails: Vec<EmailRecord> = (1..=12).map(|i| email(&format!("m{i}"))).collect();

        let outcome =
            run_batch_pipeline(&emails, &profile(), &model, SourceQuery::TransactionAlerts, &fast_config())
                .await;

        assert_eq!(outcome.abandoned_batches, 1);
        assert_eq!(outcome.processed_count, 2);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn batch_size_is_clamped() {
        let model = ScriptedModel::new(vec![
            Ok("[]".to_string()),
            Ok("[]".to_string()),
        ]);
        let emails: Vec<EmailRecord> = (1..=12).map(|i| email(&format!("m{i}"))).collect();

        let config = BatchConfig {
            batch_size: 50,
            ..fast_config()
        };
        let outcome =
            run_batch_pipeline(&emails, &profile(), &model, SourceQuery::TransactionAlerts, &config)
                .await;

        // 50 clamps to 10, so 12 emails take two calls.
        assert_eq!(model.calls().await, 2);
        assert_eq!(outcome.processed_count, 12);
    }

    #[test]
    fn classify_maps_status_codes() {
        assert_eq!(classify(&rate_limited()), ErrorClass::RateLimit);
        assert_eq!(
            classify(&LlmError::ApiError {
                status: 429,
                message: String::new()
            }),
            ErrorClass::RateLimit
        );
        assert_eq!(
            classify(&LlmError::Unavailable("down".to_string())),
            ErrorClass::Unavailable
        );
        assert_eq!(
            classify(&LlmError::ApiError {
                status: 503,
                message: String::new()
            }),
            ErrorClass::Unavailable
        );
        assert_eq!(
            classify(&LlmError::AuthenticationError("bad key".to_string())),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(12);
        assert_eq!(backoff_delay(base, 1, cap), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, 2, cap), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, 3, cap), Duration::from_secs(12));
    }
}
