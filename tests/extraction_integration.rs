//! Integration tests for the extraction pipeline.
//!
//! These tests exercise the pieces across module boundaries with a scripted
//! model: heuristics into normalization, the batch retry loop, balance
//! reconciliation, and artifact persistence. Each module contains its own
//! unit tests for detailed logic testing.

use std::collections::VecDeque;
use std::time::Duration;

use finmail::domain::{
    CreditDebit, EmailId, EmailRecord, Identifiers, SourceQuery, UserId, UserProfile,
};
use finmail::extract::{
    build_prompt, extract_fields, normalize_response, reconcile_balance, BalanceSource,
};
use finmail::pipeline::{run_batch_pipeline, BatchConfig};
use finmail::providers::ai::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult,
    TokenUsage,
};
use finmail::storage::{DumpMetadata, FileStore, RecordDump, StoredFileKind};
use tokio::sync::Mutex;

// ============================================================================
// Fixtures
// ============================================================================

fn email(id: &str, from: &str, date_header: &str, snippet: &str) -> EmailRecord {
    EmailRecord {
        id: EmailId::from(id),
        from_address: from.to_string(),
        subject: "Alert".to_string(),
        date_header: date_header.to_string(),
        snippet: Some(snippet.to_string()),
        full_body: None,
        pdf_attachments: vec![],
        account_mapping: None,
    }
}

fn profile(phone: Option<&str>) -> UserProfile {
    UserProfile {
        user_id: UserId::from("user-1"),
        first_name: "Asha".to_string(),
        last_name: "Rao".to_string(),
        email: "asha@example.com".to_string(),
        bank_accounts: vec![],
        credit_cards: vec![],
        identifiers: Identifiers {
            pan_number: Some("ABCDE1234F".to_string()),
            date_of_birth: Some("07/03/1992".to_string()),
            phone_number: phone.map(String::from),
        },
    }
}

fn fast_config() -> BatchConfig {
    BatchConfig {
        rate_limit_base: Duration::ZERO,
        unavailable_base: Duration::ZERO,
        backoff_cap: Duration::ZERO,
        inter_batch_delay: Duration::ZERO,
        ..BatchConfig::default()
    }
}

struct ScriptedModel {
    script: Mutex<VecDeque<LlmResult<String>>>,
}

impl ScriptedModel {
    fn new(script: Vec<LlmResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
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

// ============================================================================
// Heuristics across realistic snippets
// ============================================================================

#[test]
fn heuristics_handle_a_realistic_debit_alert() {
    let fields = extract_fields(Some(
        "Rs. 1,234.50 debited from A/c XX1234 and Paid to Amazon via UPI. UTR no: AXISP123.",
    ));

    assert_eq!(fields.txn_type, Some(CreditDebit::Debit));
    assert_eq!(fields.amount, Some(1234.50));
    assert_eq!(fields.merchant.as_deref(), Some("Amazon via UPI. UTR no: AXISP123."));
    assert_eq!(fields.reference.as_deref(), Some("AXISP123"));
}

#[test]
fn heuristics_never_fail_on_empty_input() {
    assert_eq!(extract_fields(None), extract_fields(None));
    assert!(extract_fields(None).amount.is_none());
    assert!(extract_fields(Some("")).txn_type.is_none());
}

// ============================================================================
// Prompt to normalization round trip
// ============================================================================

#[test]
fn prose_wrapped_response_normalizes_against_the_prompted_batch() {
    let batch = vec![
        email(
            "m1",
            "alerts@icicibank.com",
            "Fri, 5 Jan 2024 10:00:00 +0530",
            "Rs. 100 debited at ATM",
        ),
        email(
            "m2",
            "statements@hdfcbank.net",
            "Fri, 5 Jan 2024 11:00:00 +0530",
            "Your monthly statement",
        ),
    ];
    let user = profile(Some("9876543210"));

    let prompt = build_prompt(&batch, &user);
    assert!(prompt.contains("id: m1"));
    assert!(prompt.contains("id: m2"));

    let response = r#"Here is the extraction you asked for:
[
  {"email_id": "m1", "txn_date": "2024-01-05", "txn_amount": 100,
   "credit_debit": "debit", "rcvd_from_paid_to": "ATM"},
  {"email_id": "m2", "statement_type": "monthly",
   "pdf_password_protected": true, "pdf_password": "MISSING_INFO"}
]
Let me know if you need anything else."#;

    let records = normalize_response(response, &batch, &user, SourceQuery::BankStatements);
    assert_eq!(records.len(), 2);

    let txn = records[0].as_transaction().unwrap();
    assert_eq!(txn.amount, 100.0);
    assert_eq!(txn.credit_or_debit, CreditDebit::Debit);

    // The recognized bank's password is recomputed from profile fields:
    // last five phone digits plus DDMMYY date of birth.
    let statement = records[1].as_statement().unwrap();
    assert_eq!(statement.pdf_password.as_deref(), Some("43210070392"));
}

#[test]
fn missing_derivation_input_becomes_a_named_sentinel() {
    let batch = vec![email(
        "m2",
        "statements@hdfcbank.net",
        "Fri, 5 Jan 2024 11:00:00 +0530",
        "Your monthly statement",
    )];
    let user = profile(None);

    let response = r#"[{"email_id": "m2", "statement_type": "monthly",
        "pdf_password_protected": true, "pdf_password": "MISSING_INFO"}]"#;
    let records = normalize_response(response, &batch, &user, SourceQuery::BankStatements);

    let statement = records[0].as_statement().unwrap();
    assert_eq!(
        statement.pdf_password.as_deref(),
        Some("{phone number} needed")
    );
}

// ============================================================================
// Batch loop resilience
// ============================================================================

#[tokio::test]
async fn rate_limited_batch_retries_without_duplicating_records() {
    let model = ScriptedModel::new(vec![
        Err(LlmError::RateLimited {
            retry_after_secs: None,
        }),
        Err(LlmError::RateLimited {
            retry_after_secs: Some(1),
        }),
        Ok(r#"[{"email_id": "m1", "txn_amount": 250.0}]"#.to_string()),
    ]);
    let emails = vec![email(
        "m1",
        "alerts@bank.com",
        "Fri, 5 Jan 2024 10:00:00 +0530",
        "Rs. 250 debited",
    )];

    let outcome = run_batch_pipeline(
        &emails,
        &profile(None),
        &model,
        SourceQuery::TransactionAlerts,
        &fast_config(),
    )
    .await;

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.processed_count, 1);
    assert_eq!(outcome.records[0].as_transaction().unwrap().amount, 250.0);
}

#[tokio::test]
async fn garbage_response_is_an_empty_batch_not_an_error() {
    let model = ScriptedModel::new(vec![Ok("I could not parse these emails.".to_string())]);
    let emails = vec![email(
        "m1",
        "alerts@bank.com",
        "Fri, 5 Jan 2024 10:00:00 +0530",
        "Rs. 250 debited",
    )];

    let outcome = run_batch_pipeline(
        &emails,
        &profile(None),
        &model,
        SourceQuery::TransactionAlerts,
        &fast_config(),
    )
    .await;

    // The call itself succeeded, so the emails count as processed even
    // though normalization found nothing.
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.processed_count, 1);
    assert_eq!(outcome.abandoned_batches, 0);
}

// ============================================================================
// Balance reconciliation over pipeline output
// ============================================================================

#[tokio::test]
async fn newest_balance_wins_across_emails() {
    let emails = vec![
        email(
            "m1",
            "alerts@bank.com",
            "Mon, 1 Jan 2024 09:00:00 +0530",
            "Debited Rs. 10. Avl balance: 500.00",
        ),
        email(
            "m2",
            "alerts@bank.com",
            "Fri, 5 Jan 2024 09:00:00 +0530",
            "Debited Rs. 10. Avl balance: 700.00",
        ),
    ];

    let estimate = reconcile_balance(&emails, &[]);
    assert_eq!(estimate.amount, Some(700.0));
    assert_eq!(estimate.source, BalanceSource::EmailScan);
    assert_eq!(estimate.as_of_date.as_deref(), Some("2024-01-05"));
}

#[tokio::test]
async fn record_balance_outranks_email_scan() {
    let model = ScriptedModel::new(vec![Ok(
        r#"[{"email_id": "m1", "txn_amount": 10, "txn_date": "2024-01-06",
             "available_balance": 900}]"#
            .to_string(),
    )]);
    let emails = vec![email(
        "m1",
        "alerts@bank.com",
        "Fri, 5 Jan 2024 09:00:00 +0530",
        "Debited Rs. 10. Avl balance: 700.00",
    )];

    let outcome = run_batch_pipeline(
        &emails,
        &profile(None),
        &model,
        SourceQuery::TransactionAlerts,
        &fast_config(),
    )
    .await;
    let estimate = reconcile_balance(&emails, &outcome.records);

    assert_eq!(estimate.amount, Some(900.0));
    assert_eq!(estimate.source, BalanceSource::Transaction);
}

// ============================================================================
// Persisted artifact shape
// ============================================================================

#[tokio::test]
async fn persisted_records_round_trip_with_exact_field_names() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path());

    let batch = vec![email(
        "m1",
        "alerts@bank.com",
        "Fri, 5 Jan 2024 10:00:00 +0530",
        "Rs. 100 debited",
    )];
    let records = normalize_response(
        r#"[{"email_id": "m1", "txn_amount": 100, "utr_number": "AX1"}]"#,
        &batch,
        &profile(None),
        SourceQuery::TransactionAlerts,
    );

    let dump = RecordDump {
        metadata: DumpMetadata {
            query: "all".to_string(),
            count: records.len(),
            fetched_at: "2024-01-05T10:00:00Z".to_string(),
        },
        records,
    };
    let path = store
        .write(StoredFileKind::GeminiTransactions, &dump)
        .await
        .unwrap();

    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let record = &value["records"][0];
    assert_eq!(record["emailId"], "m1");
    assert_eq!(record["utrNumber"], "AX1");
    assert_eq!(record["creditOrDebit"], "unknown");
    assert_eq!(record["source"], "transaction_alerts");

    let filename = path.file_name().unwrap().to_string_lossy().into_owned();
    let back: RecordDump = store.read(&filename).await.unwrap();
    assert_eq!(back.records.len(), 1);
    assert_eq!(back.records[0].email_id().0, "m1");
}
