//! User profile types.
//!
//! A profile holds the identity and account inventory used to scope Gmail
//! searches and to derive statement passwords. Profiles are created via an
//! explicit setup call, persisted one file per profile, merged field-by-field
//! on update, and deleted explicitly. There is no concurrency control; the
//! last writer wins.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Identity plus account inventory for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccount>,
    #[serde(default)]
    pub credit_cards: Vec<CreditCard>,
    #[serde(default)]
    pub identifiers: Identifiers,
}

impl UserProfile {
    /// Full display name.
    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Applies a partial update, replacing only the fields that are present.
    pub fn merge(&mut self, update: ProfileUpdate) {
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(bank_accounts) = update.bank_accounts {
            self.bank_accounts = bank_accounts;
        }
        if let Some(credit_cards) = update.credit_cards {
            self.credit_cards = credit_cards;
        }
        if let Some(identifiers) = update.identifiers {
            if let Some(pan) = identifiers.pan_number {
                self.identifiers.pan_number = Some(pan);
            }
            if let Some(dob) = identifiers.date_of_birth {
                self.identifiers.date_of_birth = Some(dob);
            }
            if let Some(phone) = identifiers.phone_number {
                self.identifiers.phone_number = Some(phone);
            }
        }
    }
}

/// One bank account in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub account_number: String,
    pub bank_name: String,
    pub account_type: String,
}

/// One credit card in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCard {
    pub card_number: String,
    pub provider: String,
    pub card_type: String,
}

/// Optional identity documents used as password-derivation inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    /// National taxpayer identifier. Used solely for password derivation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
    /// Date of birth, DD/MM/YYYY as entered by the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    /// Registered mobile number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub bank_accounts: Option<Vec<BankAccount>>,
    pub credit_cards: Option<Vec<CreditCard>>,
    pub identifiers: Option<Identifiers>,
}
