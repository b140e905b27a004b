//! User profile store.
//!
//! One JSON file per profile, named by user ID. Updates are plain
//! read-modify-write with no locking: simultaneous writers lose data
//! silently, last writer wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::domain::{
    BankAccount, CreditCard, Identifiers, ProfileUpdate, UserId, UserProfile,
};

/// Input for profile creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub bank_accounts: Vec<BankAccount>,
    #[serde(default)]
    pub credit_cards: Vec<CreditCard>,
    #[serde(default)]
    pub identifiers: Identifiers,
}

/// Profile store over one directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store's root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &UserId) -> PathBuf {
        self.dir.join(format!("profile_{}.json", user_id))
    }

    /// Creates and persists a new profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] before anything is written when the
    /// first name is empty.
    pub async fn create(&self, new: NewProfile) -> Result<UserProfile, StoreError> {
        if new.first_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "profile requires a first name".to_string(),
            ));
        }

        let profile = UserProfile {
            user_id: UserId::generate(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            bank_accounts: new.bank_accounts,
            credit_cards: new.credit_cards,
            identifiers: new.identifiers,
        };

        self.persist(&profile).await?;
        tracing::info!(user_id = %profile.user_id, "profile created");
        Ok(profile)
    }

    /// Loads a profile by ID.
    pub async fn get(&self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        let path = self.path_for(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(user_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Applies a partial update and persists the result.
    ///
    /// Read-modify-write; a concurrent update to the same profile is lost.
    pub async fn update(
        &self,
        user_id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, StoreError> {
        let mut profile = self.get(user_id).await?;
        profile.merge(update);
        self.persist(&profile).await?;
        tracing::info!(user_id = %user_id, "profile updated");
        Ok(profile)
    }

    /// Deletes a profile.
    pub async fn delete(&self, user_id: &UserId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(user_id)).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, "profile deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(user_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists all stored profiles.
    pub async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let mut profiles = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(profiles),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.starts_with("profile_") || !filename.ends_with(".json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            match serde_json::from_slice(&bytes) {
                Ok(profile) => profiles.push(profile),
                Err(error) => {
                    // A file appearing mid-write is readable but not yet
                    // valid JSON; skip it rather than failing the listing.
                    tracing::warn!(%filename, %error, "skipping unreadable profile file");
                }
            }
        }

        profiles.sort_by(|a: &UserProfile, b| a.user_id.0.cmp(&b.user_id.0));
        Ok(profiles)
    }

    async fn persist(&self, profile: &UserProfile) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(profile)?;
        tokio::fs::write(self.path_for(&profile.user_id), bytes).await?;
        Ok(())
    }
}
