use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    choice, max_chars, other_companion, validated, weighted_choice, Choice, ClaimKind,
};
use crate::claims::forms::{blank_as_none, checkbox, date_field};
use crate::claims::lookups::{LookupRegistry, WeightedTable};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    pub chapter_title: Option<String>,
    pub chapter_authors: Option<String>,
    pub publisher: Option<String>,
    pub city: Option<String>,
    pub isbn: Option<String>,
    pub pub_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceDetails {
    pub conf_name: String,
    pub city: Option<String>,
    pub conf_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalArticle {
    pub article_type: Option<Choice>,
    pub journal: Choice,
    pub other_journal_name: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub start_page: Option<String>,
    pub end_page: Option<String>,
    pub pub_month: Option<String>,
    pub pub_year: String,
    pub pmid: Option<String>,
    pub is_epub: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublicationDetails {
    Book(BookDetails),
    Conference(ConferenceDetails),
    Journal(JournalArticle),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub pub_type: Choice,
    pub title: String,
    pub authors: String,
    pub details: PublicationDetails,
}

impl Publication {
    /// PubMed identifier, only recorded for journal articles.
    pub fn pmid(&self) -> Option<&str> {
        match &self.details {
            PublicationDetails::Journal(article) => article.pmid.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PublicationForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub pub_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub authors: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub chapter_title: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub chapter_authors: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub isbn: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub conf_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub conf_date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub article_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub journal: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub other_journal_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub volume: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub issue: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub start_page: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub end_page: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub pub_month: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub pub_year: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 255))]
    pub pmid: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_epub: bool,
}

impl ClaimKind for Publication {
    const RESOURCE: &'static str = "publications";
    const ENTITY_NAME: &'static str = "Publication";
    type Form = PublicationForm;

    fn from_form(form: PublicationForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let pub_type = weighted_choice(
            &mut errors,
            "pub_type",
            form.pub_type.as_deref(),
            true,
            lookups,
            WeightedTable::PublicationType,
        );
        let title = errors.require("title", form.title);
        let authors = errors.require("authors", form.authors);

        let details = match form.kind.as_deref() {
            Some("book") => {
                let pub_year = errors.require("pub_year", form.pub_year);
                pub_year.map(|pub_year| {
                    PublicationDetails::Book(BookDetails {
                        chapter_title: form.chapter_title,
                        chapter_authors: form.chapter_authors,
                        publisher: form.publisher,
                        city: form.city,
                        isbn: form.isbn,
                        pub_year,
                    })
                })
            }
            Some("conference") => {
                let conf_name = errors.require("conf_name", form.conf_name);
                let conf_date =
                    date_field(&mut errors, "conf_date", form.conf_date.as_deref(), true);
                match (conf_name, conf_date) {
                    (Some(conf_name), Some(conf_date)) => {
                        Some(PublicationDetails::Conference(ConferenceDetails {
                            conf_name,
                            city: form.city,
                            conf_date,
                        }))
                    }
                    _ => None,
                }
            }
            Some("journal") => {
                let article_type = weighted_choice(
                    &mut errors,
                    "article_type",
                    form.article_type.as_deref(),
                    false,
                    lookups,
                    WeightedTable::ArticleType,
                );
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
                let pub_year = errors.require("pub_year", form.pub_year);
                match (journal, pub_year) {
                    (Some(journal), Some(pub_year)) => {
                        Some(PublicationDetails::Journal(JournalArticle {
                            article_type,
                            journal,
                            other_journal_name,
                            volume: form.volume,
                            issue: form.issue,
                            start_page: form.start_page,
                            end_page: form.end_page,
                            pub_month: form.pub_month,
                            pub_year,
                            pmid: form.pmid,
                            is_epub: form.is_epub,
                        }))
                    }
                    _ => None,
                }
            }
            Some(_) => {
                errors.add("kind", INVALID_CHOICE);
                None
            }
            None => {
                errors.add("kind", REQUIRED);
                None
            }
        };

        match (pub_type, title, authors, details) {
            (Some(pub_type), Some(title), Some(authors), Some(details)) if errors.is_empty() => {
                Ok(Self {
                    pub_type,
                    title,
                    authors,
                    details,
                })
            }
            _ => Err(errors),
        }
    }

    fn title(&self) -> String {
        self.title.clone()
    }
}
