use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{max_chars, other_companion, validated, weighted_choice, Choice, ClaimKind};
use crate::claims::domain::UnknownChoice;
use crate::claims::forms::{blank_as_none, checkbox, date_field, decimal_field, integer_field};
use crate::claims::lookups::{LookupRegistry, WeightedTable};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

const MAX_HOURS: f64 = 999.99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    pub lecture_type: Choice,
    pub other_lecture_type: Option<String>,
    pub name: String,
    pub course_code: Option<String>,
    pub start_date: NaiveDate,
    pub hours: f64,
    pub is_cash: bool,
    pub is_series: bool,
    pub end_date: NaiveDate,
    pub num_sessions: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LectureForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub lecture_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub other_lecture_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub course_code: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub hours: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_cash: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_series: bool,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub num_sessions: Option<String>,
}

impl ClaimKind for Lecture {
    const RESOURCE: &'static str = "lectures";
    const ENTITY_NAME: &'static str = "Lecture";
    type Form = LectureForm;

    fn from_form(form: LectureForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let lecture_type = weighted_choice(
            &mut errors,
            "lecture_type",
            form.lecture_type.as_deref(),
            true,
            lookups,
            WeightedTable::LectureType,
        );
        let other_lecture_type = other_companion(
            &mut errors,
            "other_lecture_type",
            lecture_type.as_ref(),
            form.other_lecture_type,
        );
        max_chars(
            &mut errors,
            "other_lecture_type",
            other_lecture_type.as_ref(),
            50,
        );
        let name = errors.require("name", form.name);
        let start_date = date_field(&mut errors, "start_date", form.start_date.as_deref(), true);
        let hours = decimal_field(
            &mut errors,
            "hours",
            form.hours.as_deref(),
            true,
            0.0,
            MAX_HOURS,
        );

        // A single lecture spans one session on its start date.
        let (end_date, num_sessions) = if form.is_series {
            let end_date = date_field(&mut errors, "end_date", form.end_date.as_deref(), true);
            let num_sessions = integer_field(
                &mut errors,
                "num_sessions",
                form.num_sessions.as_deref(),
                true,
                1u32,
                u32::MAX,
            );
            if let (Some(start), Some(end)) = (start_date, end_date) {
                if end < start {
                    errors.add("end_date", "End date must be on or after the start date.");
                }
            }
            (end_date, num_sessions)
        } else {
            (start_date, Some(1))
        };

        match (lecture_type, name, start_date, hours, end_date, num_sessions) {
            (
                Some(lecture_type),
                Some(name),
                Some(start_date),
                Some(hours),
                Some(end_date),
                Some(num_sessions),
            ) if errors.is_empty() => Ok(Self {
                lecture_type,
                other_lecture_type,
                name,
                course_code: form.course_code,
                start_date,
                hours,
                is_cash: form.is_cash,
                is_series: form.is_series,
                end_date,
                num_sessions,
            }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub exam_type: Choice,
    pub other_exam_name: Option<String>,
    pub student_name: String,
    pub hours: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExamForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub exam_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub other_exam_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub student_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub hours: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date: Option<String>,
}

impl ClaimKind for Exam {
    const RESOURCE: &'static str = "exams";
    const ENTITY_NAME: &'static str = "Exam";
    type Form = ExamForm;

    fn from_form(form: ExamForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let exam_type = weighted_choice(
            &mut errors,
            "exam_type",
            form.exam_type.as_deref(),
            true,
            lookups,
            WeightedTable::ExamType,
        );
        let other_exam_name = other_companion(
            &mut errors,
            "other_exam_name",
            exam_type.as_ref(),
            form.other_exam_name,
        );
        max_chars(&mut errors, "other_exam_name", other_exam_name.as_ref(), 50);
        let student_name = errors.require("student_name", form.student_name);
        let hours = decimal_field(
            &mut errors,
            "hours",
            form.hours.as_deref(),
            true,
            0.0,
            MAX_HOURS,
        );
        let date = date_field(&mut errors, "date", form.date.as_deref(), true);

        match (exam_type, student_name, hours, date) {
            (Some(exam_type), Some(student_name), Some(hours), Some(date)) if errors.is_empty() => {
                Ok(Self {
                    exam_type,
                    other_exam_name,
                    student_name,
                    hours,
                    date,
                })
            }
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        let kind = self
            .other_exam_name
            .as_deref()
            .unwrap_or(self.exam_type.name.as_str());
        format!("{kind}: {}", self.student_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidentYear {
    Pgy1,
    Pgy2,
    Pgy3,
    Pgy4,
    Pgy5,
    Graduated,
}

impl ResidentYear {
    pub const fn code(self) -> u8 {
        match self {
            ResidentYear::Pgy1 => 1,
            ResidentYear::Pgy2 => 2,
            ResidentYear::Pgy3 => 3,
            ResidentYear::Pgy4 => 4,
            ResidentYear::Pgy5 => 5,
            ResidentYear::Graduated => 6,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ResidentYear::Pgy1 => "PGY-1",
            ResidentYear::Pgy2 => "PGY-2",
            ResidentYear::Pgy3 => "PGY-3",
            ResidentYear::Pgy4 => "PGY-4",
            ResidentYear::Pgy5 => "PGY-5",
            ResidentYear::Graduated => "Graduated",
        }
    }
}

impl fmt::Display for ResidentYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResidentYear {
    type Err = UnknownChoice;

    /// Accepts the numeric code or the label, e.g. `3` or `PGY-3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_uppercase();
        let year = match value.as_str() {
            "1" | "PGY-1" | "PGY1" => ResidentYear::Pgy1,
            "2" | "PGY-2" | "PGY2" => ResidentYear::Pgy2,
            "3" | "PGY-3" | "PGY3" => ResidentYear::Pgy3,
            "4" | "PGY-4" | "PGY4" => ResidentYear::Pgy4,
            "5" | "PGY-5" | "PGY5" => ResidentYear::Pgy5,
            "6" | "GRADUATED" | "GRAD" => ResidentYear::Graduated,
            _ => return Err(UnknownChoice(s.trim().to_string())),
        };
        Ok(year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervision {
    pub supervision_type: Choice,
    pub student_name: String,
    pub resident_year: Option<ResidentYear>,
    pub duration: Option<f64>,
    pub frequency: Option<Choice>,
    pub hours: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SupervisionForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub supervision_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 50))]
    pub student_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub resident_year: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub hours: Option<String>,
}

/// PAC attendance is the only supervision recorded in hours.
fn is_pac(supervision_type: &Choice) -> bool {
    supervision_type
        .name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "PAC")
}

impl ClaimKind for Supervision {
    const RESOURCE: &'static str = "supervision";
    const ENTITY_NAME: &'static str = "Supervision";
    type Form = SupervisionForm;

    fn from_form(form: SupervisionForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let supervision_type = weighted_choice(
            &mut errors,
            "supervision_type",
            form.supervision_type.as_deref(),
            true,
            lookups,
            WeightedTable::SupervisionType,
        );
        let student_name = errors.require("student_name", form.student_name);
        let resident_year = match form.resident_year.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<ResidentYear>() {
                Ok(year) => Some(year),
                Err(_) => {
                    errors.add("resident_year", INVALID_CHOICE);
                    None
                }
            },
        };
        let duration = decimal_field(
            &mut errors,
            "duration",
            form.duration.as_deref(),
            false,
            0.0,
            MAX_HOURS,
        );
        let frequency = weighted_choice(
            &mut errors,
            "frequency",
            form.frequency.as_deref(),
            false,
            lookups,
            WeightedTable::WorkFrequencyType,
        );
        let hours = decimal_field(
            &mut errors,
            "hours",
            form.hours.as_deref(),
            false,
            0.0,
            MAX_HOURS,
        );
        if hours.is_none()
            && form.hours.is_none()
            && supervision_type.as_ref().map_or(false, is_pac)
        {
            errors.add("hours", REQUIRED);
        }

        match (supervision_type, student_name) {
            (Some(supervision_type), Some(student_name)) if errors.is_empty() => Ok(Self {
                supervision_type,
                student_name,
                resident_year,
                duration,
                frequency,
                hours,
            }),
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        format!("{}: {}", self.supervision_type.name, self.student_name)
    }
}
