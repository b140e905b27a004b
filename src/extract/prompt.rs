//! Batch prompt builder.
//!
//! Assembles a fixed-size batch of emails plus the user's profile identifiers
//! into one instruction block for the text-generation model. The batch size
//! cap bounds both prompt length and the blast radius of a single failed
//! call. Password derivation rules are spelled out as literal text because
//! the derivation itself happens in the model's reasoning, not here.

use crate::domain::{EmailRecord, UserProfile};

/// Fixed number of emails per model call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Longest body excerpt included per email.
const MAX_BODY_CHARS: usize = 2000;

/// Placeholder the model is told to emit when it cannot derive a password.
/// The normalizer's post-pass keys off this value.
pub const MISSING_INFO_PLACEHOLDER: &str = "MISSING_INFO";

/// System prompt for the extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a precise assistant that extracts \
structured personal-finance data from bank and credit card emails. You reply with a JSON \
array and nothing else.";

/// Builds the instruction block for one batch of at most
/// [`MAX_BATCH_SIZE`] emails.
///
/// The caller (the batch loop) is responsible for chunking; longer slices are
/// truncated to the cap.
pub fn build_prompt(batch: &[EmailRecord], profile: &UserProfile) -> String {
    let batch = &batch[..batch.len().min(MAX_BATCH_SIZE)];
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(&format!(
        "Below are {} emails from the mailbox of {}. Classify each as a bank \
         transaction alert or an account/card statement and extract its fields.\n\n",
        batch.len(),
        profile.full_name(),
    ));

    for (index, email) in batch.iter().enumerate() {
        prompt.push_str(&format!("Email {}:\n", index + 1));
        prompt.push_str(&format!("  id: {}\n", email.id));
        prompt.push_str(&format!("  from: {}\n", email.from_address));
        prompt.push_str(&format!("  subject: {}\n", email.subject));
        prompt.push_str(&format!("  date: {}\n", email.date_header));
        if !email.pdf_attachments.is_empty() {
            let names: Vec<&str> = email
                .pdf_attachments
                .iter()
                .map(|a| a.filename.as_str())
                .collect();
            prompt.push_str(&format!("  pdf attachments: {}\n", names.join(", ")));
        }
        prompt.push_str(&format!("  content: {}\n\n", excerpt(email)));
    }

    prompt.push_str("Account holder details (use them to derive PDF passwords):\n");
    prompt.push_str(&format!("  name: {}\n", profile.full_name()));
    prompt.push_str(&format!(
        "  PAN: {}\n",
        profile.identifiers.pan_number.as_deref().unwrap_or("not provided")
    ));
    prompt.push_str(&format!(
        "  date of birth: {}\n",
        profile
            .identifiers
            .date_of_birth
            .as_deref()
            .unwrap_or("not provided")
    ));
    prompt.push_str(&format!(
        "  phone number: {}\n\n",
        profile
            .identifiers
            .phone_number
            .as_deref()
            .unwrap_or("not provided")
    ));

    prompt.push_str(
        "Return ONLY a JSON array with exactly one object per email, using these field \
         names and no others.\n\
         For a transaction email: email_id, txn_date (ISO yyyy-mm-dd), utr_number \
         (string or null), credit_debit (\"credit\", \"debit\" or \"unknown\"), \
         rcvd_from_paid_to (sender for credits, recipient for debits), narration, \
         txn_amount (non-negative number), available_balance (number or null).\n\
         For a statement email: email_id, statement_type (\"monthly\", \"quarterly\", \
         \"annual\" or \"unknown\"), statement_date, pdf_filename, \
         pdf_password_protected (boolean), pdf_password (string or null).\n\n",
    );
    prompt.push_str(&format!(
        "Password rules: HDFC Bank statement PDFs use the last five digits of the \
         registered mobile number followed by the date of birth in DDMMYY format. \
         Other banks state their rule in the email body; follow it using the account \
         holder details above. If a required detail is not provided, set pdf_password \
         to \"{}\".\n",
        MISSING_INFO_PLACEHOLDER
    ));

    prompt
}

/// Body when fetched full, snippet otherwise, capped at [`MAX_BODY_CHARS`].
fn excerpt(email: &EmailRecord) -> String {
    match email.text() {
        Some(text) if text.len() > MAX_BODY_CHARS => {
            let mut cut = MAX_BODY_CHARS;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}…", &text[..cut])
        }
        Some(text) => text.to_string(),
        None => "(no content)".to_string(),
    }
}
