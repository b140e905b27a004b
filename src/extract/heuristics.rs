//! Heuristic field parser.
//!
//! Best-effort structured extraction from unstructured alert text. Each field
//! has an ordered chain of matchers applied until one succeeds; a field whose
//! chain finds nothing stays `None`. Malformed or missing input never errors:
//! no snippet means an all-`None` result, not a failure.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{CreditDebit, EmailRecord, StatementType};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Amount, in priority order: currency prefix, currency suffix, bare number.
re!(re_amount_prefixed, r"(?i)(?:\brs\.?|\binr|₹)\s*([0-9][0-9,]*(?:\.[0-9]+)?)");
re!(re_amount_suffixed, r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:(?:rs\.?|inr)\b|₹)");
re!(re_amount_bare, r"\b([0-9][0-9,]*(?:\.[0-9]+)?)\b");

// Counterparty, in priority order.
re!(re_merchant_terminal, r"(?i)terminal owner name\s+([^,\r\n]+)");
re!(re_merchant_labeled, r"(?i)merchant\s*:\s*([^,\r\n]+)");
re!(re_merchant_at, r"(?i)\bat\s+([^,\r\n]+)");
re!(re_merchant_to, r"(?i)\bto\s+([^,\r\n]+)");

// Transaction references; the separator colon is what keeps `transaction
// alert` from matching.
re!(re_ref_utr, r"(?i)\butr\s*(?:no\.?|number)?\s*:\s*([A-Za-z0-9]+)");
re!(re_ref_reference, r"(?i)\breference\s*(?:no\.?|number)?\s*:\s*([A-Za-z0-9]+)");
re!(
    re_ref_transaction,
    r"(?i)\btransaction\s*(?:id|no\.?|number)?\s*:\s*([A-Za-z0-9]+)"
);

// Statement period, anchored on a trailing phrase.
re!(re_period_labeled, r"(?i)\bperiod\s*:?\s+([^,\r\n.]+)");
re!(
    re_period_for_unit,
    r"(?i)\bfor(?:\s+the)?\s+(?:month|quarter|year)(?:\s+(?:of|ending|ended))?\s+([^,\r\n.]+)"
);
re!(re_period_for_month, r"(?i)\bfor\s+([A-Za-z]+\s+[0-9]{4})");

/// Known password-hint phrases, matched as literal substrings.
const PASSWORD_HINT_PHRASES: &[&str] = &[
    "password is your pan number",
    "password is your pan",
    "password is your date of birth",
    "password is your dob",
    "password is your customer id",
    "pan number in capital letters",
    "last 5 digits of your registered mobile number",
    "password protected document",
];

/// Best-effort guess at the structured fields of one email.
///
/// All fields are independent; any subset may be `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicFields {
    /// Detected transaction direction.
    pub txn_type: Option<CreditDebit>,
    /// Detected amount. `None` on parse failure, never zero.
    pub amount: Option<f64>,
    /// Detected merchant/counterparty.
    pub merchant: Option<String>,
    /// Detected UTR/reference token, uppercased.
    pub reference: Option<String>,
    /// Detected statement cadence.
    pub statement_type: Option<StatementType>,
    /// Detected statement period text.
    pub statement_period: Option<String>,
    /// Matched password-hint phrase, verbatim from the known list.
    pub password_hint: Option<String>,
}

/// Extracts a best-effort field guess from a text snippet.
///
/// Absence of the snippet yields an all-`None` result; this function never
/// fails. Extraction is pure: the same input always yields the same output.
pub fn extract_fields(snippet: Option<&str>) -> HeuristicFields {
    let Some(text) = snippet else {
        return HeuristicFields::default();
    };
    if text.trim().is_empty() {
        return HeuristicFields::default();
    }

    HeuristicFields {
        txn_type: Some(detect_txn_type(text)),
        amount: detect_amount(text),
        merchant: detect_merchant(text),
        reference: detect_reference(text),
        statement_type: detect_statement_type(text),
        statement_period: detect_statement_period(text),
        password_hint: detect_password_hint(text),
    }
}

/// Extracts a best-effort field guess from one fetched message, preferring
/// the full body over the snippet.
pub fn extract_email_fields(email: &EmailRecord) -> HeuristicFields {
    extract_fields(email.text())
}

/// Scans lowercased text for direction keywords; debit markers win.
fn detect_txn_type(text: &str) -> CreditDebit {
    let lower = text.to_lowercase();
    if ["debit", "withdrawal", "paid"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        CreditDebit::Debit
    } else if ["credit", "deposit", "received"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        CreditDebit::Credit
    } else {
        CreditDebit::Unknown
    }
}

/// First matching amount pattern wins; a match that fails numeric parse
/// yields `None` rather than trying later patterns.
fn detect_amount(text: &str) -> Option<f64> {
    for re in [re_amount_prefixed(), re_amount_suffixed(), re_amount_bare()] {
        if let Some(captures) = re.captures(text) {
            return captures[1].replace(',', "").parse().ok();
        }
    }
    None
}

/// Captures up to the next comma or line break, then trims.
fn detect_merchant(text: &str) -> Option<String> {
    for re in [
        re_merchant_terminal(),
        re_merchant_labeled(),
        re_merchant_at(),
        re_merchant_to(),
    ] {
        if let Some(captures) = re.captures(text) {
            let value = captures[1].trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn detect_reference(text: &str) -> Option<String> {
    for re in [re_ref_utr(), re_ref_reference(), re_ref_transaction()] {
        if let Some(captures) = re.captures(text) {
            return Some(captures[1].to_uppercase());
        }
    }
    None
}

fn detect_statement_type(text: &str) -> Option<StatementType> {
    let lower = text.to_lowercase();
    if !lower.contains("statement") {
        return None;
    }
    let cadence = if lower.contains("monthly") {
        StatementType::Monthly
    } else if lower.contains("quarterly") {
        StatementType::Quarterly
    } else if lower.contains("annual") || lower.contains("yearly") {
        StatementType::Annual
    } else {
        StatementType::Unknown
    };
    Some(cadence)
}

fn detect_statement_period(text: &str) -> Option<String> {
    for re in [
        re_period_labeled(),
        re_period_for_unit(),
        re_period_for_month(),
    ] {
        if let Some(captures) = re.captures(text) {
            let value = captures[1].trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Literal substring match against the known hint phrases; the phrase itself
/// is returned verbatim. Password VALUE derivation happens downstream with
/// profile data.
fn detect_password_hint(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PASSWORD_HINT_PHRASES
        .iter()
        .find(|phrase| lower.contains(*phrase))
        .map(|phrase| phrase.to_string())
}
