use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validated, ClaimKind};
use crate::claims::evidence::{EvidenceField, CPA_FILE, VERIFICATION_FILE};
use crate::claims::forms::{blank_as_none, integer_field};
use crate::claims::lookups::LookupRegistry;
use crate::claims::validation::FieldErrors;

/// Continuing professional activity record. The activity file itself is evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpa {
    pub cpa_value: u16,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CpaForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub cpa_value: Option<String>,
}

impl ClaimKind for Cpa {
    const RESOURCE: &'static str = "cpas";
    const ENTITY_NAME: &'static str = "CPA";
    const EVIDENCE: &'static [EvidenceField] = &[CPA_FILE, VERIFICATION_FILE];
    type Form = CpaForm;

    fn from_form(form: CpaForm, _lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let cpa_value = integer_field(
            &mut errors,
            "cpa_value",
            form.cpa_value.as_deref(),
            false,
            0u16,
            3000,
        );

        if errors.is_empty() {
            Ok(Self {
                cpa_value: cpa_value.unwrap_or_default(),
            })
        } else {
            Err(errors)
        }
    }

    fn title(&self) -> String {
        format!("CPA ({} points)", self.cpa_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpa_value_defaults_to_zero_and_is_bounded() {
        let lookups = LookupRegistry::new();
        let cpa = Cpa::from_form(CpaForm::default(), &lookups).expect("valid");
        assert_eq!(cpa.cpa_value, 0);

        let form = CpaForm {
            cpa_value: Some("3001".to_string()),
        };
        let errors = Cpa::from_form(form, &lookups).expect_err("too large");
        assert!(errors.contains("cpa_value"));
    }

    #[test]
    fn cpa_accepts_document_evidence_only() {
        assert_eq!(Cpa::EVIDENCE[0].name, "cpa_file");
        assert!(!Cpa::EVIDENCE[0].allowed_types.contains(&"image/png"));
    }
}
