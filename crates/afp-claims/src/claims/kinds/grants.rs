use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    choice, max_chars, other_companion, validated, weighted_choice, Choice, ClaimKind,
};
use crate::claims::forms::{blank_as_none, checkbox, date_field, decimal_field, integer_field};
use crate::claims::lookups::{LookupRegistry, WeightedTable};
use crate::claims::validation::FieldErrors;

pub const DEFAULT_CURRENCY: &str = "CAD";
const MAX_AMOUNT: f64 = 999_999_999_999.99;

/// A non-negative amount held as integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub cents: u64,
    pub currency: String,
}

impl Money {
    pub fn new(cents: u64, currency: &str) -> Self {
        Self {
            cents,
            currency: currency.to_ascii_uppercase(),
        }
    }

    fn clean(
        errors: &mut FieldErrors,
        amount: Option<&str>,
        currency: Option<&str>,
    ) -> Option<Self> {
        let currency = currency.unwrap_or(DEFAULT_CURRENCY).trim();
        let currency_ok = currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic());
        if !currency_ok {
            errors.add("amount_currency", "Select a valid currency.");
        }

        let amount = decimal_field(errors, "amount", amount, true, 0.0, MAX_AMOUNT)?;
        currency_ok.then(|| Self::new((amount * 100.0).round() as u64, currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.cents / 100,
            self.cents % 100,
            self.currency
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub name: String,
    pub amount: Money,
    pub agency: Choice,
    pub other_grant_agency: Option<String>,
    pub pi_list: String,
    pub coi_list: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub at_camh: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GrantForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub amount_currency: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub agency: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub other_grant_agency: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub pi_list: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub coi_list: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub at_camh: bool,
}

impl ClaimKind for Grant {
    const RESOURCE: &'static str = "grants";
    const ENTITY_NAME: &'static str = "Grant";
    type Form = GrantForm;

    fn from_form(form: GrantForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let name = errors.require("name", form.name);
        let pi_list = errors.require("pi_list", form.pi_list);
        let coi_list = errors.require("coi_list", form.coi_list);
        let amount = Money::clean(
            &mut errors,
            form.amount.as_deref(),
            form.amount_currency.as_deref(),
        );
        let agency = choice(
            &mut errors,
            "agency",
            form.agency.as_deref(),
            true,
            |id| lookups.agency(id),
        );
        let other_grant_agency = other_companion(
            &mut errors,
            "other_grant_agency",
            agency.as_ref(),
            form.other_grant_agency,
        );
        max_chars(
            &mut errors,
            "other_grant_agency",
            other_grant_agency.as_ref(),
            50,
        );

        let start_date = date_field(&mut errors, "start_date", form.start_date.as_deref(), true);
        let end_date = date_field(&mut errors, "end_date", form.end_date.as_deref(), true);
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add("end_date", "End date must be on or after the start date.");
            }
        }

        match (name, pi_list, coi_list, amount, agency, start_date, end_date) {
            (
                Some(name),
                Some(pi_list),
                Some(coi_list),
                Some(amount),
                Some(agency),
                Some(start_date),
                Some(end_date),
            ) if errors.is_empty() => Ok(Self {
                name,
                amount,
                agency,
                other_grant_agency,
                pi_list,
                coi_list,
                start_date,
                end_date,
                at_camh: form.at_camh,
            }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantReview {
    pub review_type: Choice,
    pub agency: String,
    pub name: Option<String>,
    pub date: NaiveDate,
    pub is_member: bool,
    pub num_days: f64,
    pub num_reviewed: u8,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GrantReviewForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub review_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 100))]
    pub agency: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_member: bool,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub num_days: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub num_reviewed: Option<String>,
}

impl ClaimKind for GrantReview {
    const RESOURCE: &'static str = "grantreviews";
    const ENTITY_NAME: &'static str = "Grant Review";
    type Form = GrantReviewForm;

    fn from_form(form: GrantReviewForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let review_type = weighted_choice(
            &mut errors,
            "review_type",
            form.review_type.as_deref(),
            true,
            lookups,
            WeightedTable::GrantReviewType,
        );
        let agency = errors.require("agency", form.agency);
        let date = date_field(&mut errors, "date", form.date.as_deref(), true);
        let num_days = decimal_field(
            &mut errors,
            "num_days",
            form.num_days.as_deref(),
            true,
            0.0,
            25.0,
        );
        let num_reviewed = integer_field(
            &mut errors,
            "num_reviewed",
            form.num_reviewed.as_deref(),
            true,
            0u8,
            99,
        );

        match (review_type, agency, date, num_days, num_reviewed) {
            (Some(review_type), Some(agency), Some(date), Some(num_days), Some(num_reviewed))
                if errors.is_empty() =>
            {
                Ok(Self {
                    review_type,
                    agency,
                    name: form.name,
                    date,
                    is_member: form.is_member,
                    num_days,
                    num_reviewed,
                })
            }
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.agency),
            None => self.agency.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::lookups::LookupId;

    struct Fixture {
        lookups: LookupRegistry,
        cihr: LookupId,
        other: LookupId,
    }

    fn fixture() -> Fixture {
        let lookups = LookupRegistry::new();
        let federal = lookups.add_agency_type("Federal").expect("type");
        let category = lookups
            .add_weighted(WeightedTable::GrantCategory, "Tier 1", 3.0)
            .expect("category");
        let cihr = lookups
            .add_agency("CIHR", federal.id, category.id)
            .expect("agency");
        let other = lookups
            .add_agency("Other", federal.id, category.id)
            .expect("agency");
        Fixture {
            lookups,
            cihr: cihr.id,
            other: other.id,
        }
    }

    fn form(agency: LookupId) -> GrantForm {
        GrantForm {
            name: Some("Early psychosis cohort".to_string()),
            amount: Some("125000.50".to_string()),
            amount_currency: None,
            agency: Some(agency.to_string()),
            other_grant_agency: None,
            pi_list: Some("Smith J".to_string()),
            coi_list: Some("Lee K".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2026-12-31".to_string()),
            at_camh: true,
        }
    }

    #[test]
    fn grant_amount_defaults_to_canadian_dollars() {
        let fixture = fixture();
        let grant = Grant::from_form(form(fixture.cihr), &fixture.lookups).expect("valid");
        assert_eq!(grant.amount, Money::new(12_500_050, "CAD"));
        assert_eq!(grant.amount.to_string(), "125000.50 CAD");
    }

    #[test]
    fn grant_end_date_cannot_precede_start() {
        let fixture = fixture();
        let mut form = form(fixture.cihr);
        form.end_date = Some("2023-06-30".to_string());
        let errors = Grant::from_form(form, &fixture.lookups).expect_err("dates reversed");
        assert!(errors.contains("end_date"));
    }

    #[test]
    fn other_agency_needs_a_name() {
        let fixture = fixture();
        let errors =
            Grant::from_form(form(fixture.other), &fixture.lookups).expect_err("missing agency");
        assert!(errors.contains("other_grant_agency"));

        let mut named = form(fixture.other);
        named.other_grant_agency = Some("Brain Canada".to_string());
        let grant = Grant::from_form(named, &fixture.lookups).expect("valid");
        assert_eq!(grant.other_grant_agency.as_deref(), Some("Brain Canada"));
    }

    #[test]
    fn grant_review_bounds_days_and_counts() {
        let lookups = LookupRegistry::new();
        let kind = lookups
            .add_weighted(WeightedTable::GrantReviewType, "External panel", 100.0)
            .expect("type");
        let form = GrantReviewForm {
            review_type: Some(kind.id.to_string()),
            agency: Some("CIHR".to_string()),
            name: None,
            date: Some("2024-03-14".to_string()),
            is_member: false,
            num_days: Some("26".to_string()),
            num_reviewed: Some("100".to_string()),
        };
        let errors = GrantReview::from_form(form, &lookups).expect_err("out of range");
        assert!(errors.contains("num_days"));
        assert!(errors.contains("num_reviewed"));
    }
}
