use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{CsvTable, ImportError, ImportSink, ImportSummary, ImportTarget, RowError};
use crate::accounts::{
    normalize_email, resolve, AccountDirectory, AccountError, UserAccount, UserId,
};
use crate::claims::forms::{blank_as_none, is_checked, FormSubmission};
use crate::claims::lookups::{LookupId, LookupRegistry};
use crate::claims::validation::FieldErrors;

const COLUMNS: &[&str] = &[
    "id",
    "email",
    "first_name",
    "middle_name",
    "last_name",
    "is_staff",
    "is_active",
    "is_physician",
    "division",
    "other_division",
    "rank",
];
const REQUIRED_COLUMNS: &[&str] = &["email", "first_name", "last_name"];

pub const EMAIL_TAKEN: &str = "User with this Email address already exists.";
pub const REPEATED_IN_FILE: &str = "This value appears on more than one row.";

#[derive(Debug, Default, Deserialize, Validate)]
struct AccountRow {
    #[serde(default, deserialize_with = "blank_as_none")]
    id: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(email)]
    email: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    middle_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    last_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    is_staff: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    is_active: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    is_physician: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    division: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    other_division: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    rank: Option<String>,
}

/// One validated row. Blank flag columns are `None` and keep the stored value.
#[derive(Debug)]
struct AccountChanges {
    id: Option<UserId>,
    email: String,
    first_name: String,
    middle_name: Option<String>,
    last_name: String,
    division: Option<LookupId>,
    other_division: Option<String>,
    rank: Option<LookupId>,
    is_staff: Option<bool>,
    is_active: Option<bool>,
    is_physician: Option<bool>,
}

impl AccountRow {
    fn into_changes(self, lookups: &LookupRegistry) -> Result<AccountChanges, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(report) => FieldErrors::from(report),
        };

        let id = match self.id.as_deref().map(str::parse::<UserId>) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                errors.add("id", "Enter a valid UUID.");
                None
            }
        };
        let email = errors.require("email", self.email);
        let first_name = errors.require("first_name", self.first_name);
        let last_name = errors.require("last_name", self.last_name);
        let division = resolve(&mut errors, "division", self.division.as_deref(), |id| {
            lookups.division(id).is_some()
        });
        let rank = resolve(&mut errors, "rank", self.rank.as_deref(), |id| {
            lookups.rank(id).is_some()
        });

        match (email, first_name, last_name) {
            (Some(email), Some(first_name), Some(last_name)) if errors.is_empty() => {
                let email = normalize_email(&email)
                    .map_err(|err| FieldErrors::single("email", err.to_string()))?;
                Ok(AccountChanges {
                    id,
                    email,
                    first_name,
                    middle_name: self.middle_name,
                    last_name,
                    division,
                    other_division: self.other_division,
                    rank,
                    is_staff: self.is_staff.as_deref().map(is_checked),
                    is_active: self.is_active.as_deref().map(is_checked),
                    is_physician: self.is_physician.as_deref().map(is_checked),
                })
            }
            _ => Err(errors),
        }
    }
}

impl AccountChanges {
    fn apply(self, mut account: UserAccount) -> UserAccount {
        account.email = self.email;
        account.first_name = self.first_name;
        account.middle_name = self.middle_name;
        account.last_name = self.last_name;
        account.division = self.division;
        account.other_division = self.other_division;
        account.rank = self.rank;
        if let Some(is_staff) = self.is_staff {
            account.is_staff = is_staff;
        }
        if let Some(is_active) = self.is_active {
            account.is_active = is_active;
        }
        if let Some(is_physician) = self.is_physician {
            account.is_physician = is_physician;
        }
        account
    }

    fn into_new_account(self) -> Result<UserAccount, AccountError> {
        let mut account = UserAccount::new(&self.email, &self.first_name, &self.last_name)?;
        if let Some(id) = self.id {
            account.id = id;
        }
        // A new staff row is not a physician unless the file says so.
        account.is_physician = self.is_physician.unwrap_or(!self.is_staff.unwrap_or(false));
        Ok(self.apply(account))
    }
}

enum Planned {
    Create(UserAccount),
    Update(UserAccount),
}

/// Creates or updates accounts, matching rows by `id` and then by `email`.
pub struct AccountImporter {
    accounts: Arc<dyn AccountDirectory>,
    lookups: Arc<LookupRegistry>,
}

impl AccountImporter {
    pub fn new(accounts: Arc<dyn AccountDirectory>, lookups: Arc<LookupRegistry>) -> Self {
        Self { accounts, lookups }
    }

    fn plan(
        &self,
        changes: AccountChanges,
        seen_ids: &mut HashSet<UserId>,
        seen_emails: &mut HashSet<String>,
    ) -> Result<Result<Planned, FieldErrors>, AccountError> {
        let mut errors = FieldErrors::new();
        let mut repeated = !seen_emails.insert(changes.email.to_ascii_lowercase());

        let by_email = self.accounts.find_by_email(&changes.email)?;
        let existing = match changes.id {
            Some(id) => {
                if !seen_ids.insert(id) {
                    errors.add("id", REPEATED_IN_FILE);
                }
                self.accounts.fetch(&id)?
            }
            None => by_email.clone(),
        };

        let owner = existing.as_ref().map(|account| account.id).or(changes.id);
        if let Some(holder) = by_email {
            if Some(holder.id) != owner {
                errors.add("email", EMAIL_TAKEN);
            }
        }
        if let Some(account) = &existing {
            if changes.id.is_none() && !seen_ids.insert(account.id) {
                repeated = true;
            }
        }
        if repeated {
            errors.add("email", REPEATED_IN_FILE);
        }

        if !errors.is_empty() {
            return Ok(Err(errors));
        }
        Ok(Ok(match existing {
            Some(account) => Planned::Update(changes.apply(account)),
            None => Planned::Create(changes.into_new_account()?),
        }))
    }
}

impl ImportSink for AccountImporter {
    fn target(&self) -> ImportTarget {
        ImportTarget::Users
    }

    fn import(&self, data: &[u8]) -> Result<ImportSummary, ImportError> {
        let table = CsvTable::read(data, COLUMNS, REQUIRED_COLUMNS)?;

        let mut seen_ids = HashSet::new();
        let mut seen_emails = HashSet::new();
        let mut planned = Vec::with_capacity(table.rows.len());
        let mut failures = Vec::new();
        for (line, row) in &table.rows {
            let submission = FormSubmission::from_pairs(table.cells(row));
            let outcome = match submission
                .decode::<AccountRow>()
                .and_then(|row| row.into_changes(&self.lookups))
            {
                Ok(changes) => self.plan(changes, &mut seen_ids, &mut seen_emails)?,
                Err(errors) => Err(errors),
            };
            match outcome {
                Ok(plan) => planned.push(plan),
                Err(errors) => failures.push(RowError {
                    line: *line,
                    errors,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(ImportError::Rows(failures));
        }

        let mut summary = ImportSummary::default();
        for plan in planned {
            match plan {
                Planned::Create(account) => {
                    self.accounts.insert(account)?;
                    summary.created += 1;
                }
                Planned::Update(account) => {
                    self.accounts.update(account)?;
                    summary.updated += 1;
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            "accounts imported"
        );
        Ok(summary)
    }
}
