//! AI response parser and normalizer.
//!
//! Turns the free-text model response for one batch into typed records. The
//! contract is deliberately permissive: the model is not guaranteed to emit
//! only JSON, so the parser tolerates leading/trailing prose, treats a parse
//! failure as an empty batch (logged, never propagated), and defaults every
//! optional field. A post-pass recomputes statement passwords for the one
//! bank whose derivation rule is known locally.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::domain::{
    CreditDebit, EmailId, EmailRecord, ExtractedRecord, SourceQuery, StatementRecord,
    StatementType, TransactionRecord, UserProfile,
};
use crate::extract::prompt::MISSING_INFO_PLACEHOLDER;

/// Sender-domain fragment of the bank whose password rule is derived locally.
const RECOGNIZED_BANK_DOMAIN: &str = "hdfcbank";

/// Narration fallback when neither the model nor the source email offers one.
const NARRATION_FALLBACK: &str = "No narration available";

/// Normalizes one batch response into records.
///
/// `batch` is the slice of emails the prompt was built from; it is consulted
/// only to backfill defaults (snippet narration, attachment flags, dates).
/// The model's `email_id` claim is otherwise trusted as-is.
pub fn normalize_response(
    response_text: &str,
    batch: &[EmailRecord],
    profile: &UserProfile,
    source: SourceQuery,
) -> Vec<ExtractedRecord> {
    let Some(span) = extract_json_array(response_text) else {
        tracing::warn!("no JSON array found in model response");
        return Vec::new();
    };

    let elements: Vec<Value> = match serde_json::from_str(span) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!("model response span is not a JSON array");
            return Vec::new();
        }
        Err(error) => {
            tracing::warn!(%error, "failed to parse model response as JSON");
            return Vec::new();
        }
    };

    let mut records: Vec<ExtractedRecord> = elements
        .iter()
        .enumerate()
        .map(|(index, element)| normalize_element(element, index, batch, source))
        .collect();

    for record in &mut records {
        if let ExtractedRecord::Statement(statement) = record {
            apply_password_override(statement, batch, profile);
        }
    }

    records
}

/// Locates the first bracketed span via a greedy match: first `[` to last
/// `]`. Returns `None` when the response has no such span.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn normalize_element(
    element: &Value,
    index: usize,
    batch: &[EmailRecord],
    source: SourceQuery,
) -> ExtractedRecord {
    let email_id = get_str(element, "email_id")
        .or_else(|| batch.get(index).map(|e| e.id.0.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    // Backfill source: the claimed id looked up in the batch. A claim that
    // points outside the batch is kept, it just gets no backfill.
    let source_email = batch.iter().find(|e| e.id.0 == email_id);

    let is_transaction =
        element.get("txn_date").map(|v| !v.is_null()).unwrap_or(false)
            || element.get("txn_amount").map(|v| !v.is_null()).unwrap_or(false);
    let is_statement = element
        .get("statement_type")
        .map(|v| !v.is_null())
        .unwrap_or(false)
        || element.get("pdf_filename").map(|v| !v.is_null()).unwrap_or(false);

    if !is_transaction && is_statement {
        ExtractedRecord::Statement(StatementRecord {
            email_id: EmailId::from(email_id),
            statement_type: get_str(element, "statement_type")
                .map(|s| StatementType::parse(&s))
                .unwrap_or(StatementType::Unknown),
            statement_date: get_str(element, "statement_date")
                .or_else(|| source_email.and_then(email_date_iso))
                .unwrap_or_default(),
            pdf_filename: get_str(element, "pdf_filename")
                .or_else(|| {
                    source_email
                        .and_then(|e| e.pdf_attachments.first())
                        .map(|a| a.filename.clone())
                })
                .unwrap_or_default(),
            pdf_password_protected: get_bool(element, "pdf_password_protected")
                .unwrap_or(false),
            pdf_password: get_str(element, "pdf_password"),
            source,
        })
    } else {
        // Transactions, plus the fallback shape for elements that are
        // neither: those keep direction `unknown` and a zero amount.
        ExtractedRecord::Transaction(TransactionRecord {
            email_id: EmailId::from(email_id),
            txn_date: get_str(element, "txn_date")
                .or_else(|| source_email.and_then(email_date_iso))
                .unwrap_or_default(),
            utr_number: get_str(element, "utr_number"),
            credit_or_debit: get_str(element, "credit_debit")
                .map(|s| CreditDebit::parse(&s))
                .unwrap_or(CreditDebit::Unknown),
            counterparty: get_str(element, "rcvd_from_paid_to")
                .unwrap_or_else(|| "Unknown".to_string()),
            narration: get_str(element, "narration")
                .or_else(|| source_email.and_then(|e| e.snippet.clone()))
                .unwrap_or_else(|| NARRATION_FALLBACK.to_string()),
            amount: get_f64(element, "txn_amount").map(f64::abs).unwrap_or(0.0),
            available_balance: get_f64(element, "available_balance").map(f64::abs),
            source,
            pdf_attached: source_email.map(|e| e.has_pdf()).unwrap_or(false),
            pdf_password_protected: get_bool(element, "pdf_password_protected")
                .unwrap_or(false),
            pdf_password: get_str(element, "pdf_password"),
        })
    }
}

/// Recomputes the password for recognized-bank statements that came back with
/// a missing-info placeholder: last five digits of the registered mobile plus
/// the date of birth in DDMMYY. An absent input becomes a human-readable
/// sentinel naming the missing field instead of an error.
fn apply_password_override(
    statement: &mut StatementRecord,
    batch: &[EmailRecord],
    profile: &UserProfile,
) {
    if !statement.pdf_password_protected {
        return;
    }
    if !statement
        .pdf_password
        .as_deref()
        .is_some_and(is_missing_placeholder)
    {
        return;
    }
    let from_recognized_bank = batch
        .iter()
        .find(|e| e.id == statement.email_id)
        .and_then(|e| e.sender_domain())
        .is_some_and(|domain| domain.contains(RECOGNIZED_BANK_DOMAIN));
    if !from_recognized_bank {
        return;
    }

    statement.pdf_password = Some(derive_recognized_bank_password(profile));
}

fn is_missing_placeholder(value: &str) -> bool {
    value == MISSING_INFO_PLACEHOLDER || value.to_lowercase().contains("missing")
}

/// Deterministic password derivation from profile fields.
fn derive_recognized_bank_password(profile: &UserProfile) -> String {
    let phone_digits: Option<String> = profile.identifiers.phone_number.as_deref().map(|p| {
        let digits: String = p.chars().filter(|c| c.is_ascii_digit()).collect();
        let skip = digits.len().saturating_sub(5);
        digits[skip..].to_string()
    });
    let phone_digits = phone_digits.filter(|d| !d.is_empty());

    let dob_ddmmyy = profile
        .identifiers
        .date_of_birth
        .as_deref()
        .and_then(parse_dob)
        .map(|d| d.format("%d%m%y").to_string());

    match (phone_digits, dob_ddmmyy) {
        (Some(phone), Some(dob)) => format!("{}{}", phone, dob),
        (None, Some(_)) => "{phone number} needed".to_string(),
        (Some(_), None) => "{DOB} needed".to_string(),
        (None, None) => "{phone number} and {DOB} needed".to_string(),
    }
}

/// Accepts the date-of-birth formats profiles are entered with. An
/// unparseable value counts as missing.
fn parse_dob(value: &str) -> Option<NaiveDate> {
    for format in ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value.trim(), format) {
            return Some(date);
        }
    }
    None
}

/// Source email's `Date` header as an ISO date, when it parses.
fn email_date_iso(email: &EmailRecord) -> Option<String> {
    DateTime::parse_from_rfc2822(email.date_header.trim())
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

// Tolerant field readers: the model sometimes quotes numbers and booleans.

fn get_str(element: &Value, key: &str) -> Option<String> {
    match element.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn get_f64(element: &Value, key: &str) -> Option<f64> {
    match element.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn get_bool(element: &Value, key: &str) -> Option<bool> {
    match element.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
