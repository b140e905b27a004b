//! Balance reconciler.
//!
//! Produces the single most-recent account balance estimate from a run's
//! emails and normalized records. A balance carried on a normalized
//! transaction record wins over one scraped from raw email text; raw text is
//! scanned newest-first with an ordered list of balance-phrase patterns.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{EmailRecord, ExtractedRecord};

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(
    re_avl_balance,
    r"(?i)avl\.?\s*bal(?:ance)?\.?\s*(?:is\s*)?[:\-]?\s*(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)"
);
re!(
    re_available_balance,
    r"(?i)available\s+balance\s*(?:is\s*)?[:\-]?\s*(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)"
);
re!(
    re_closing_balance,
    r"(?i)closing\s+balance\s*(?:is\s*)?[:\-]?\s*(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)"
);
re!(
    re_bal_labeled,
    r"(?i)\bbal(?:ance)?\s*[:\-]\s*(?:rs\.?|inr|₹)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)"
);

/// Where a balance estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Carried on a normalized transaction record.
    Transaction,
    /// Scraped from raw email text.
    EmailScan,
    /// Nothing found; the estimate is empty.
    Derived,
}

/// The most-recent balance estimate for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEstimate {
    pub amount: Option<f64>,
    pub source: BalanceSource,
    pub as_of_date: Option<String>,
}

/// Reconciles the latest balance from records and raw emails.
pub fn reconcile_balance(
    emails: &[EmailRecord],
    records: &[ExtractedRecord],
) -> BalanceEstimate {
    // Normalized records take precedence: latest txn_date with a balance.
    let mut best: Option<(&str, f64)> = None;
    for record in records {
        if let Some(txn) = record.as_transaction() {
            if let Some(balance) = txn.available_balance {
                // ISO date strings sort lexicographically; ties keep the
                // later record.
                if best.map_or(true, |(date, _)| txn.txn_date.as_str() >= date) {
                    best = Some((txn.txn_date.as_str(), balance));
                }
            }
        }
    }
    if let Some((date, amount)) = best {
        return BalanceEstimate {
            amount: Some(amount),
            source: BalanceSource::Transaction,
            as_of_date: (!date.is_empty()).then(|| date.to_string()),
        };
    }

    // Raw scan, newest header date first. Unparseable dates sort last.
    let mut dated: Vec<(Option<DateTime<chrono::FixedOffset>>, &EmailRecord)> = emails
        .iter()
        .map(|e| (DateTime::parse_from_rfc2822(e.date_header.trim()).ok(), e))
        .collect();
    dated.sort_by(|(a, _), (b, _)| b.cmp(a));

    for (date, email) in dated {
        let Some(text) = email.text() else { continue };
        for re in [
            re_avl_balance(),
            re_available_balance(),
            re_closing_balance(),
            re_bal_labeled(),
        ] {
            if let Some(captures) = re.captures(text) {
                if let Ok(amount) = captures[1].replace(',', "").parse::<f64>() {
                    return BalanceEstimate {
                        amount: Some(amount),
                        source: BalanceSource::EmailScan,
                        as_of_date: date.map(|d| d.format("%Y-%m-%d").to_string()),
                    };
                }
            }
        }
    }

    BalanceEstimate {
        amount: None,
        source: BalanceSource::Derived,
        as_of_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CreditDebit, EmailId, SourceQuery, TransactionRecord,
    };
    use pretty_assertions::assert_eq;

    fn email(id: &str, date_header: &str, snippet: &str) -> EmailRecord {
        EmailRecord {
            id: EmailId::from(id),
            from_address: "alerts@bank.com".to_string(),
            subject: "Alert".to_string(),
            date_header: date_header.to_string(),
            snippet: Some(snippet.to_string()),
            full_body: None,
            pdf_attachments: vec![],
            account_mapping: None,
        }
    }

    fn txn(date: &str, balance: Option<f64>) -> ExtractedRecord {
        ExtractedRecord::Transaction(TransactionRecord {
            email_id: EmailId::from("m1"),
            txn_date: date.to_string(),
            utr_number: None,
            credit_or_debit: CreditDebit::Debit,
            counterparty: "Shop".to_string(),
            narration: "purchase".to_string(),
            amount: 100.0,
            available_balance: balance,
            source: SourceQuery::TransactionAlerts,
            pdf_attached: false,
            pdf_password_protected: false,
            pdf_password: None,
        })
    }

    #[test]
    fn record_balance_takes_precedence_over_email_scan() {
        let emails = vec![email(
            "m1",
            "Mon, 1 Jan 2024 09:00:00 +0530",
            "Avl balance: Rs. 9,999.00",
        )];
        let records = vec![txn("2024-01-02", Some(1234.0))];

        let estimate = reconcile_balance(&emails, &records);
        assert_eq!(estimate.amount, Some(1234.0));
        assert_eq!(estimate.source, BalanceSource::Transaction);
        assert_eq!(estimate.as_of_date.as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn latest_record_balance_wins() {
        let records = vec![
            txn("2024-01-01", Some(500.0)),
            txn("2024-01-05", Some(700.0)),
            txn("2024-01-03", Some(600.0)),
        ];
        let estimate = reconcile_balance(&[], &records);
        assert_eq!(estimate.amount, Some(700.0));
    }

    #[test]
    fn newest_email_balance_wins() {
        let emails = vec![
            email(
                "m1",
                "Mon, 1 Jan 2024 09:00:00 +0530",
                "Available balance is Rs. 500.00",
            ),
            email(
                "m2",
                "Fri, 5 Jan 2024 09:00:00 +0530",
                "Available balance is Rs. 700.00",
            ),
        ];

        let estimate = reconcile_balance(&emails, &[]);
        assert_eq!(estimate.amount, Some(700.0));
        assert_eq!(estimate.source, BalanceSource::EmailScan);
        assert_eq!(estimate.as_of_date.as_deref(), Some("2024-01-05"));
    }

    #[test]
    fn comma_stripped_capture() {
        let emails = vec![email(
            "m1",
            "Mon, 1 Jan 2024 09:00:00 +0530",
            "Closing balance: 1,05,000.50",
        )];
        let estimate = reconcile_balance(&emails, &[]);
        assert_eq!(estimate.amount, Some(105000.50));
    }

    #[test]
    fn abbreviated_avl_bal_phrase() {
        let emails = vec![email(
            "m1",
            "Mon, 1 Jan 2024 09:00:00 +0530",
            "Txn done. Avl Bal INR 2500",
        )];
        let estimate = reconcile_balance(&emails, &[]);
        assert_eq!(estimate.amount, Some(2500.0));
    }

    #[test]
    fn records_without_balance_fall_through_to_emails() {
        let emails = vec![email(
            "m1",
            "Mon, 1 Jan 2024 09:00:00 +0530",
            "avl balance: 42.00",
        )];
        let records = vec![txn("2024-01-02", None)];

        let estimate = reconcile_balance(&emails, &records);
        assert_eq!(estimate.amount, Some(42.0));
        assert_eq!(estimate.source, BalanceSource::EmailScan);
    }

    #[test]
    fn nothing_found_is_marked_derived() {
        let emails = vec![email("m1", "not a date", "no numbers of interest")];
        let estimate = reconcile_balance(&emails, &[]);
        assert_eq!(estimate.amount, None);
        assert_eq!(estimate.source, BalanceSource::Derived);
        assert_eq!(estimate.as_of_date, None);
    }
}
