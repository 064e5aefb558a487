//! User accounts as seen by the claims service.
//!
//! Sign-in happens upstream. This module only tracks who exists, who is
//! staff, and the profile fields physicians may maintain themselves.

pub mod router;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::claims::forms::blank_as_none;
use crate::claims::lookups::{LookupId, LookupRegistry};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

pub use router::profile_router;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub division: Option<LookupId>,
    pub other_division: Option<String>,
    pub rank: Option<LookupId>,
    pub is_physician: bool,
    pub is_staff: bool,
    pub is_active: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(email: &str, first_name: &str, last_name: &str) -> Result<Self, AccountError> {
        Ok(Self {
            id: UserId::generate(),
            email: normalize_email(email)?,
            first_name: first_name.trim().to_string(),
            middle_name: None,
            last_name: last_name.trim().to_string(),
            division: None,
            other_division: None,
            rank: None,
            is_physician: true,
            is_staff: false,
            is_active: true,
            archived_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self.is_physician = false;
        self
    }

    /// Archived or deactivated accounts are treated as signed out.
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.archived_at.is_none()
    }

    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Trim and lowercase the domain part, keeping the local part as entered.
pub fn normalize_email(raw: &str) -> Result<String, AccountError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AccountError::MissingEmail);
    }
    Ok(match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_ascii_lowercase()),
        None => trimmed.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("users must have an email address")]
    MissingEmail,
    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),
    #[error("account not found")]
    NotFound,
    #[error("account directory unavailable: {0}")]
    Unavailable(String),
}

pub trait AccountDirectory: Send + Sync {
    fn insert(&self, account: UserAccount) -> Result<UserAccount, AccountError>;
    fn update(&self, account: UserAccount) -> Result<(), AccountError>;
    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, AccountError>;
    /// Case-insensitive match on the whole address.
    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AccountError>;
    fn list(&self) -> Result<Vec<UserAccount>, AccountError>;

    /// The account, if it exists and may sign in.
    fn active(&self, id: &UserId) -> Result<Option<UserAccount>, AccountError> {
        Ok(self.fetch(id)?.filter(UserAccount::can_sign_in))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountDirectory {
    accounts: Arc<Mutex<HashMap<UserId, UserAccount>>>,
}

impl InMemoryAccountDirectory {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, UserAccount>>, AccountError> {
        self.accounts
            .lock()
            .map_err(|_| AccountError::Unavailable("account mutex poisoned".to_string()))
    }
}

fn email_taken(
    accounts: &HashMap<UserId, UserAccount>,
    email: &str,
    except: Option<UserId>,
) -> bool {
    accounts
        .values()
        .any(|account| Some(account.id) != except && account.email.eq_ignore_ascii_case(email))
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn insert(&self, account: UserAccount) -> Result<UserAccount, AccountError> {
        let mut guard = self.lock()?;
        if email_taken(&guard, &account.email, None) {
            return Err(AccountError::DuplicateEmail(account.email));
        }
        guard.insert(account.id, account.clone());
        Ok(account)
    }

    fn update(&self, account: UserAccount) -> Result<(), AccountError> {
        let mut guard = self.lock()?;
        if !guard.contains_key(&account.id) {
            return Err(AccountError::NotFound);
        }
        if email_taken(&guard, &account.email, Some(account.id)) {
            return Err(AccountError::DuplicateEmail(account.email));
        }
        guard.insert(account.id, account);
        Ok(())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, AccountError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AccountError> {
        let email = email.trim();
        Ok(self
            .lock()?
            .values()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn list(&self) -> Result<Vec<UserAccount>, AccountError> {
        let mut accounts: Vec<_> = self.lock()?.values().cloned().collect();
        accounts.sort_by(|left, right| left.email.cmp(&right.email));
        Ok(accounts)
    }
}

/// Make sure a staff account exists for `email`, promoting an existing one.
pub fn ensure_admin(
    directory: &dyn AccountDirectory,
    email: &str,
    id: Option<UserId>,
) -> Result<UserAccount, AccountError> {
    if let Some(mut existing) = directory.find_by_email(email)? {
        if !existing.is_staff || !existing.is_active {
            existing.is_staff = true;
            existing.is_active = true;
            directory.update(existing.clone())?;
            info!(user = %existing.id, "promoted existing account to staff");
        }
        return Ok(existing);
    }

    let mut account = UserAccount::new(email, "AFP", "Admin")?.staff();
    if let Some(id) = id {
        account.id = id;
    }
    let account = directory.insert(account)?;
    info!(user = %account.id, "created bootstrap admin account");
    Ok(account)
}

/// Fields a physician may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub middle_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub division: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub other_division: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub rank: Option<String>,
}

impl ProfileForm {
    /// Apply the form to `account`, resolving division and rank against the lookups.
    pub fn apply(
        self,
        mut account: UserAccount,
        lookups: &LookupRegistry,
    ) -> Result<UserAccount, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(report) => FieldErrors::from(report),
        };

        let first_name = errors.require("first_name", self.first_name);
        let last_name = errors.require("last_name", self.last_name);
        let email = errors.require("email", self.email);

        let division = resolve(&mut errors, "division", self.division.as_deref(), |id| {
            lookups.division(id).is_some()
        });
        let rank = resolve(&mut errors, "rank", self.rank.as_deref(), |id| {
            lookups.rank(id).is_some()
        });

        if self.division.is_none() && self.other_division.is_none() {
            errors.add("division", REQUIRED);
        }

        match (first_name, last_name, email) {
            (Some(first_name), Some(last_name), Some(email)) if errors.is_empty() => {
                account.email =
                    normalize_email(&email).map_err(|err| FieldErrors::single("email", err.to_string()))?;
                account.first_name = first_name;
                account.middle_name = self.middle_name;
                account.last_name = last_name;
                account.division = division;
                account.other_division = self.other_division;
                account.rank = rank;
                Ok(account)
            }
            _ => Err(errors),
        }
    }
}

pub(crate) fn resolve(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    exists: impl Fn(LookupId) -> bool,
) -> Option<LookupId> {
    let raw = raw?;
    match raw.parse::<LookupId>() {
        Ok(id) if exists(id) => Some(id),
        _ => {
            errors.add(field, INVALID_CHOICE);
            None
        }
    }
}
