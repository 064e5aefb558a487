use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    choice, max_chars, other_companion, validated, weighted_choice, Choice, ClaimKind,
};
use crate::claims::forms::{blank_as_none, checkbox, integer_field};
use crate::claims::lookups::{LookupRegistry, WeightedTable};
use crate::claims::validation::FieldErrors;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub name: String,
    pub organization: String,
    pub award_level: Choice,
    pub cash_prize: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AwardForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub organization: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub award_level: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub cash_prize: bool,
}

impl ClaimKind for Award {
    const RESOURCE: &'static str = "awards";
    const ENTITY_NAME: &'static str = "Award";
    type Form = AwardForm;

    fn from_form(form: AwardForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let name = errors.require("name", form.name);
        let organization = errors.require("organization", form.organization);
        let award_level = weighted_choice(
            &mut errors,
            "award_level",
            form.award_level.as_deref(),
            true,
            lookups,
            WeightedTable::AwardLevel,
        );

        match (name, organization, award_level) {
            (Some(name), Some(organization), Some(award_level)) if errors.is_empty() => Ok(Self {
                name,
                organization,
                award_level,
                cash_prize: form.cash_prize,
            }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub promoted_to: Choice,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PromotionForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub promoted_to: Option<String>,
}

impl ClaimKind for Promotion {
    const RESOURCE: &'static str = "promotions";
    const ENTITY_NAME: &'static str = "Promotion";
    type Form = PromotionForm;

    fn from_form(form: PromotionForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let promoted_to = choice(
            &mut errors,
            "promoted_to",
            form.promoted_to.as_deref(),
            true,
            |id| lookups.rank(id),
        );

        match promoted_to {
            Some(promoted_to) if errors.is_empty() => Ok(Self { promoted_to }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        format!("Promoted to {}", self.promoted_to.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorialBoard {
    pub journal: Choice,
    pub other_journal_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct EditorialBoardForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub journal: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub other_journal_name: Option<String>,
}

impl ClaimKind for EditorialBoard {
    const RESOURCE: &'static str = "editorialboards";
    const ENTITY_NAME: &'static str = "Editorial Board";
    type Form = EditorialBoardForm;

    fn from_form(form: EditorialBoardForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let journal = choice(
            &mut errors,
            "journal",
            form.journal.as_deref(),
            true,
            |id| lookups.journal(id),
        );
        let other_journal_name = other_companion(
            &mut errors,
            "other_journal_name",
            journal.as_ref(),
            form.other_journal_name,
        );
        max_chars(
            &mut errors,
            "other_journal_name",
            other_journal_name.as_ref(),
            255,
        );

        match journal {
            Some(journal) if errors.is_empty() => Ok(Self {
                journal,
                other_journal_name,
            }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        match &self.other_journal_name {
            Some(name) => name.clone(),
            None => self.journal.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeWork {
    pub name: String,
    pub hours: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CommitteeWorkForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub hours: Option<String>,
}

impl ClaimKind for CommitteeWork {
    const RESOURCE: &'static str = "committees";
    const ENTITY_NAME: &'static str = "Committee Work";
    type Form = CommitteeWorkForm;

    fn from_form(form: CommitteeWorkForm, _lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let name = errors.require("name", form.name);
        let hours = integer_field(
            &mut errors,
            "hours",
            form.hours.as_deref(),
            true,
            0u32,
            u32::MAX,
        );

        match (name, hours) {
            (Some(name), Some(hours)) if errors.is_empty() => Ok(Self { name, hours }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        self.name.clone()
    }
}
