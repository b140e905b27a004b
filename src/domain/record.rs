//! Normalized output records of the extraction pipeline.
//!
//! Field names in the serialized form are load-bearing: the persisted JSON
//! artifacts are re-read by name in the aggregation step, so every struct here
//! serializes in camelCase with exactly the names downstream tooling expects.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::EmailId;

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditDebit {
    Credit,
    Debit,
    Unknown,
}

impl CreditDebit {
    /// Parses the model's `credit_debit` claim; anything unrecognized maps to
    /// [`CreditDebit::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "credit" => Self::Credit,
            "debit" => Self::Debit,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CreditDebit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "credit"),
            Self::Debit => write!(f, "debit"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Statement cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    Monthly,
    Quarterly,
    Annual,
    Unknown,
}

impl StatementType {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "monthly" => Self::Monthly,
            "quarterly" => Self::Quarterly,
            "annual" | "yearly" => Self::Annual,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Annual => write!(f, "annual"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which Gmail search query produced an email.
///
/// Carried through to the output records so the aggregation step can tell
/// transaction alerts apart from statement mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceQuery {
    /// Debit/credit alert mails.
    TransactionAlerts,
    /// Monthly/periodic account statements.
    BankStatements,
    /// Credit card statements.
    CardStatements,
}

impl SourceQuery {
    /// The Gmail search expression for this source.
    pub fn expression(&self) -> &'static str {
        match self {
            // Statement query carried over from the basic fetch path.
            Self::BankStatements => "subject:statement OR subject:bank",
            Self::TransactionAlerts => {
                "(debited OR credited OR \"transaction alert\") -category:promotions"
            }
            Self::CardStatements => "subject:\"credit card statement\" has:attachment",
        }
    }

    /// All queries, in the order the pipeline runs them.
    pub fn all() -> [SourceQuery; 3] {
        [
            Self::TransactionAlerts,
            Self::BankStatements,
            Self::CardStatements,
        ]
    }
}

/// Normalized output for a transaction-type email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Back-reference to the source email. Not ownership.
    pub email_id: EmailId,
    /// ISO date string. Best effort; may be wrong when both the heuristic and
    /// the model fail.
    pub txn_date: String,
    /// Bank-assigned transaction reference.
    pub utr_number: Option<String>,
    pub credit_or_debit: CreditDebit,
    /// For credits the sender, for debits the recipient.
    pub counterparty: String,
    pub narration: String,
    /// Non-negative. 0 when the model could not detect an amount.
    pub amount: f64,
    /// Non-negative when present.
    pub available_balance: Option<f64>,
    pub source: SourceQuery,
    pub pdf_attached: bool,
    pub pdf_password_protected: bool,
    /// May hold a sentinel such as `"{DOB} needed"` when derivation inputs
    /// are missing. The sentinel is intentional output, not an error.
    pub pdf_password: Option<String>,
}

/// Normalized output for a statement-type (PDF-bearing) email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRecord {
    pub email_id: EmailId,
    pub statement_type: StatementType,
    pub statement_date: String,
    pub pdf_filename: String,
    pub pdf_password_protected: bool,
    /// Same sentinel convention as [`TransactionRecord::pdf_password`].
    pub pdf_password: Option<String>,
    pub source: SourceQuery,
}

/// One normalized pipeline output element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedRecord {
    Transaction(TransactionRecord),
    Statement(StatementRecord),
}

impl ExtractedRecord {
    /// The source email this record traces back to.
    pub fn email_id(&self) -> &EmailId {
        match self {
            Self::Transaction(t) => &t.email_id,
            Self::Statement(s) => &s.email_id,
        }
    }

    pub fn as_transaction(&self) -> Option<&TransactionRecord> {
        match self {
            Self::Transaction(t) => Some(t),
            Self::Statement(_) => None,
        }
    }

    pub fn as_statement(&self) -> Option<&StatementRecord> {
        match self {
            Self::Statement(s) => Some(s),
            Self::Transaction(_) => None,
        }
    }
}
