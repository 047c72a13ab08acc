// Domain Models
// Questions, forms and responses as they are stored and returned over the API.
// Request bodies are kept loose (every field optional) so validation can report
// a precise InvalidInput instead of a generic deserialization failure.

use anyhow::{bail, ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use crate::types::{FormId, QuestionId, ResponseId, ShareToken, ValidatedText};

/// Suffix appended to the title of a duplicated form
pub const COPY_SUFFIX: &str = " (Copy)";

/// Kind of prompt a question presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    /// Free text answer
    Text,
    /// Rows x columns matrix
    Grid,
    /// Multiple choice from `options`
    CheckBox,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [QuestionType::Text, QuestionType::Grid, QuestionType::CheckBox];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "Text",
            QuestionType::Grid => "Grid",
            QuestionType::CheckBox => "CheckBox",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid question type: {s}"))
    }
}

/// A single prompt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<String>,
}

impl Question {
    /// Check the question can be placed on a form.
    /// Grid questions need both columns and rows.
    pub fn ensure_placeable(&self) -> Result<()> {
        if self.question_type == QuestionType::Grid {
            ensure!(
                !self.columns.is_empty() && !self.rows.is_empty(),
                "Grid question must have columns and rows defined"
            );
        }
        Ok(())
    }
}

/// A named, ordered collection of questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub header_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Form {
    pub fn new(
        title: ValidatedText,
        description: ValidatedText,
        questions: Vec<Question>,
        header_image: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FormId::new(),
            title: title.into_inner(),
            description: description.into_inner(),
            questions,
            header_image: header_image.map(|h| h.trim().to_string()).unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Ordered ids of the questions on this form
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id).collect()
    }

    /// Copy of this form with a fresh id, fresh timestamps and a " (Copy)" title
    pub fn duplicate(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: FormId::new(),
            title: format!("{}{}", self.title, COPY_SUFFIX),
            description: self.description.clone(),
            questions: self.questions.clone(),
            header_image: self.header_image.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One answer inside a response. `answer` is open-schema on purpose:
/// a string for Text, an array for CheckBox, an object for Grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: QuestionId,
    pub answer: JsonValue,
}

/// One respondent's answers to a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub id: ResponseId,
    pub form_id: FormId,
    pub responses: Vec<AnswerEntry>,
    pub token: ShareToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormResponse {
    pub fn new(form_id: FormId, responses: Vec<AnswerEntry>, now: DateTime<Utc>) -> Self {
        Self {
            id: ResponseId::new(),
            form_id,
            responses,
            token: ShareToken::generate(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request body for question creation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub question_text: Option<String>,
    #[serde(alias = "type")]
    pub question_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
    pub rows: Option<Vec<String>>,
}

impl NewQuestion {
    /// Validate into a storable question with a fresh id.
    ///
    /// The type is checked before the text so an unknown type is always the
    /// reported failure. With `require_grid_layout`, Grid questions must carry
    /// non-empty columns and rows.
    pub fn into_question(self, require_grid_layout: bool) -> Result<Question> {
        let question_type = match self.question_type.as_deref() {
            Some(raw) => raw.parse::<QuestionType>()?,
            None => bail!("Invalid question type: questionType is required"),
        };
        let text = ValidatedText::new("questionText", self.question_text.unwrap_or_default())?;

        if require_grid_layout && question_type == QuestionType::Grid {
            let has_columns = self.columns.as_ref().is_some_and(|c| !c.is_empty());
            let has_rows = self.rows.as_ref().is_some_and(|r| !r.is_empty());
            ensure!(
                has_columns && has_rows,
                "Grid question must have columns and rows defined"
            );
        }

        Ok(Question {
            id: QuestionId::new(),
            question_text: text.into_inner(),
            question_type,
            options: self.options.unwrap_or_default(),
            columns: self.columns.unwrap_or_default(),
            rows: self.rows.unwrap_or_default(),
        })
    }
}

/// Reference to an already stored question
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionReference {
    pub id: String,
}

/// One entry of a form's `questions` array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FormQuestionInput {
    /// Bare question id
    Id(String),
    /// `{ "id": ... }`, including a full question echoed back from the API
    Reference(QuestionReference),
    /// Inline definition, persisted together with the form
    Inline(NewQuestion),
}

/// Request body for form creation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<FormQuestionInput>,
    pub header_image: Option<String>,
}

/// One answer as submitted by a client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: Option<String>,
    pub answer: Option<JsonValue>,
}

impl AnswerInput {
    pub fn into_entry(self, position: usize) -> Result<AnswerEntry> {
        let raw_id = match self.question_id {
            Some(id) => id,
            None => bail!("Response #{} is missing questionId", position + 1),
        };
        let question_id = QuestionId::parse(&raw_id)?;
        let answer = match self.answer {
            Some(answer) if !answer.is_null() => answer,
            _ => bail!("Response #{} is missing an answer", position + 1),
        };
        Ok(AnswerEntry {
            question_id,
            answer,
        })
    }
}

/// Request body for response submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseRequest {
    pub form_id: Option<String>,
    #[serde(default)]
    pub responses: Vec<AnswerInput>,
}

/// Body returned by both shareable-link operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareableLink {
    pub shareable_url: String,
    pub token: ShareToken,
}
