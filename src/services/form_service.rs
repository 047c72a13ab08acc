// FormService - Form CRUD, search, duplication and share links
//
// Forms reference questions by id. Question entries in a create request are
// validated in order and validation stops at the first bad entry; nothing is
// written until every entry has passed.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use super::{frontend_link, now};
use crate::contracts::FormStore;
use crate::error::{FormsError, Result};
use crate::models::{CreateFormRequest, Form, FormQuestionInput, Question, ShareableLink};
use crate::types::{FormId, QuestionId, ShareToken, ValidatedSearchQuery, ValidatedText};

/// Outcome of a form deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormDeletion {
    /// Responses removed by the cascade that follows the form delete
    pub deleted_responses: u64,
}

#[derive(Clone)]
pub struct FormService {
    store: Arc<dyn FormStore>,
    base_url: Url,
}

impl FormService {
    pub fn new(store: Arc<dyn FormStore>, base_url: Url) -> Self {
        Self { store, base_url }
    }

    #[instrument(skip(self, request))]
    pub async fn create_form(&self, request: CreateFormRequest) -> Result<Form> {
        let title = ValidatedText::new("title", request.title.unwrap_or_default())
            .map_err(FormsError::from_validation)?;
        let description = ValidatedText::new("description", request.description.unwrap_or_default())
            .map_err(FormsError::from_validation)?;

        let mut questions = Vec::with_capacity(request.questions.len());
        let mut inline = Vec::new();
        for entry in request.questions {
            match entry {
                FormQuestionInput::Id(raw) => questions.push(self.resolve_question(&raw).await?),
                FormQuestionInput::Reference(reference) => {
                    questions.push(self.resolve_question(&reference.id).await?)
                }
                FormQuestionInput::Inline(definition) => {
                    let question = definition
                        .into_question(true)
                        .map_err(FormsError::from_validation)?;
                    inline.push(question.clone());
                    questions.push(question);
                }
            }
        }

        for question in &inline {
            self.store.insert_question(question).await?;
        }

        let form = Form::new(title, description, questions, request.header_image, now());
        self.store.insert_form(&form).await?;
        info!(
            form_id = %form.id,
            questions = form.questions.len(),
            inline_questions = inline.len(),
            "Form created"
        );
        Ok(form)
    }

    /// Load a stored question referenced from a form and check it can be placed
    async fn resolve_question(&self, raw_id: &str) -> Result<Question> {
        let id = QuestionId::parse(raw_id).map_err(FormsError::from_validation)?;
        let question = self
            .store
            .get_question(&id)
            .await?
            .ok_or_else(|| FormsError::invalid(format!("Question {id} does not exist")))?;
        question
            .ensure_placeable()
            .map_err(FormsError::from_validation)?;
        Ok(question)
    }

    pub async fn list_forms(&self) -> Result<Vec<Form>> {
        Ok(self.store.list_forms().await?)
    }

    /// Case-insensitive substring search over title and description.
    /// An empty result is reported as NotFound.
    #[instrument(skip(self))]
    pub async fn search_forms(&self, query: Option<&str>) -> Result<Vec<Form>> {
        let query = ValidatedSearchQuery::new(query.unwrap_or_default())
            .map_err(FormsError::from_validation)?;
        let forms = self.store.search_forms(&query).await?;
        if forms.is_empty() {
            return Err(FormsError::not_found(
                "No forms found matching the search criteria",
            ));
        }
        Ok(forms)
    }

    pub async fn get_form_by_id(&self, id: &str) -> Result<Form> {
        let id = parse_form_id(id)?;
        self.load_form(&id).await
    }

    /// Delete the form, then every response that references it.
    ///
    /// The two steps are separate store calls. A failure in between leaves
    /// the responses behind.
    #[instrument(skip(self))]
    pub async fn delete_form(&self, id: &str) -> Result<FormDeletion> {
        let id = parse_form_id(id)?;
        if !self.store.delete_form(&id).await? {
            return Err(FormsError::not_found("Form not found"));
        }

        let deleted_responses = match self.store.delete_responses_for_form(&id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(form_id = %id, error = %format!("{e:#}"), "Form deleted but its responses were not");
                return Err(e.into());
            }
        };
        info!(form_id = %id, deleted_responses, "Form deleted");
        Ok(FormDeletion { deleted_responses })
    }

    #[instrument(skip(self))]
    pub async fn duplicate_form(&self, id: &str) -> Result<Form> {
        let id = parse_form_id(id)?;
        let original = self.load_form(&id).await?;
        let copy = original.duplicate(now());
        self.store.insert_form(&copy).await?;
        info!(form_id = %copy.id, source_form_id = %id, "Form duplicated");
        Ok(copy)
    }

    /// Link to the public form page. The token is created on first use and
    /// stays the same afterwards.
    #[instrument(skip(self))]
    pub async fn get_shareable_url(&self, id: &str) -> Result<ShareableLink> {
        let id = parse_form_id(id)?;
        let token = self
            .store
            .ensure_form_share_token(&id, &ShareToken::generate(), now())
            .await?
            .ok_or_else(|| FormsError::not_found("Form not found"))?;

        Ok(ShareableLink {
            shareable_url: frontend_link(&self.base_url, &["form", token.as_str()]),
            token,
        })
    }

    pub async fn get_form_by_share_token(&self, token: &str) -> Result<Form> {
        let token = ShareToken::parse(token).map_err(FormsError::from_validation)?;
        self.store
            .get_form_by_share_token(&token)
            .await?
            .ok_or_else(|| FormsError::not_found("Form not found"))
    }

    async fn load_form(&self, id: &FormId) -> Result<Form> {
        self.store
            .get_form(id)
            .await?
            .ok_or_else(|| FormsError::not_found("Form not found"))
    }
}

pub(crate) fn parse_form_id(raw: &str) -> Result<FormId> {
    FormId::parse(raw).map_err(FormsError::from_validation)
}
