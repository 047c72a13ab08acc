// In-Memory Storage Implementation
// Implements FormStore over insertion-ordered maps. Used by the test suites and
// by `formbase-server --in-memory` for local development.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::contracts::FormStore;
use crate::models::{Form, FormResponse, Question};
use crate::types::{FormId, QuestionId, ResponseId, ShareToken, ValidatedSearchQuery};
use crate::wrappers::TracedStore;

/// Stored shape of a form: question ids only, plus the share token
#[derive(Debug, Clone)]
struct FormRecord {
    id: FormId,
    title: String,
    description: String,
    question_ids: Vec<QuestionId>,
    header_image: String,
    share_token: Option<ShareToken>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FormRecord {
    fn from_form(form: &Form) -> Self {
        Self {
            id: form.id,
            title: form.title.clone(),
            description: form.description.clone(),
            question_ids: form.question_ids(),
            header_image: form.header_image.clone(),
            share_token: None,
            created_at: form.created_at,
            updated_at: form.updated_at,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    questions: IndexMap<QuestionId, Question>,
    forms: IndexMap<FormId, FormRecord>,
    responses: IndexMap<ResponseId, FormResponse>,
}

impl MemoryState {
    fn hydrate(&self, record: &FormRecord) -> Result<Form> {
        let mut questions = Vec::with_capacity(record.question_ids.len());
        for id in &record.question_ids {
            match self.questions.get(id) {
                Some(question) => questions.push(question.clone()),
                None => bail!("Form {} references missing question {}", record.id, id),
            }
        }

        Ok(Form {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            questions,
            header_image: record.header_image.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Process-local store. Data lives as long as the value does.
#[derive(Default)]
pub struct InMemoryFormStore {
    state: RwLock<MemoryState>,
    closed: AtomicBool,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("In-memory store has been closed");
        }
        Ok(())
    }
}

#[async_trait]
impl FormStore for InMemoryFormStore {
    async fn insert_question(&self, question: &Question) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if state.questions.contains_key(&question.id) {
            bail!("Question {} already exists", question.id);
        }
        state.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(&self, id: &QuestionId) -> Result<Option<Question>> {
        self.ensure_open()?;
        Ok(self.state.read().await.questions.get(id).cloned())
    }

    async fn list_questions(&self) -> Result<Vec<Question>> {
        self.ensure_open()?;
        Ok(self.state.read().await.questions.values().cloned().collect())
    }

    async fn insert_form(&self, form: &Form) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if state.forms.contains_key(&form.id) {
            bail!("Form {} already exists", form.id);
        }
        if let Some(missing) = form
            .questions
            .iter()
            .find(|q| !state.questions.contains_key(&q.id))
        {
            bail!("Form {} references unknown question {}", form.id, missing.id);
        }
        state.forms.insert(form.id, FormRecord::from_form(form));
        Ok(())
    }

    async fn get_form(&self, id: &FormId) -> Result<Option<Form>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        state.forms.get(id).map(|r| state.hydrate(r)).transpose()
    }

    async fn list_forms(&self) -> Result<Vec<Form>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        state.forms.values().map(|r| state.hydrate(r)).collect()
    }

    async fn search_forms(&self, query: &ValidatedSearchQuery) -> Result<Vec<Form>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        state
            .forms
            .values()
            .filter(|r| query.matches(&r.title) || query.matches(&r.description))
            .map(|r| state.hydrate(r))
            .collect()
    }

    async fn delete_form(&self, id: &FormId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.state.write().await.forms.shift_remove(id).is_some())
    }

    async fn ensure_form_share_token(
        &self,
        id: &FormId,
        candidate: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<ShareToken>> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let Some(record) = state.forms.get_mut(id) else {
            return Ok(None);
        };
        if let Some(existing) = &record.share_token {
            return Ok(Some(existing.clone()));
        }
        record.share_token = Some(candidate.clone());
        record.updated_at = now;
        Ok(Some(candidate.clone()))
    }

    async fn get_form_by_share_token(&self, token: &ShareToken) -> Result<Option<Form>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        state
            .forms
            .values()
            .find(|r| r.share_token.as_ref() == Some(token))
            .map(|r| state.hydrate(r))
            .transpose()
    }

    async fn insert_response(&self, response: &FormResponse) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if state.responses.values().any(|r| r.token == response.token) {
            bail!("Response token collision");
        }
        state.responses.insert(response.id, response.clone());
        Ok(())
    }

    async fn list_responses(&self, form_id: &FormId) -> Result<Vec<FormResponse>> {
        self.ensure_open()?;
        Ok(self
            .state
            .read()
            .await
            .responses
            .values()
            .filter(|r| r.form_id == *form_id)
            .cloned()
            .collect())
    }

    async fn get_response_by_token(
        &self,
        form_id: &FormId,
        token: &ShareToken,
    ) -> Result<Option<FormResponse>> {
        self.ensure_open()?;
        Ok(self
            .state
            .read()
            .await
            .responses
            .values()
            .find(|r| r.form_id == *form_id && r.token == *token)
            .cloned())
    }

    async fn rotate_response_token(
        &self,
        form_id: &FormId,
        current: &ShareToken,
        next: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<FormResponse>> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if state.responses.values().any(|r| r.token == *next) {
            bail!("Response token collision");
        }
        let Some(response) = state
            .responses
            .values_mut()
            .find(|r| r.form_id == *form_id && r.token == *current)
        else {
            return Ok(None);
        };
        response.token = next.clone();
        response.updated_at = now;
        Ok(Some(response.clone()))
    }

    async fn delete_responses_for_form(&self, form_id: &FormId) -> Result<u64> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        let before = state.responses.len();
        state.responses.retain(|_, r| r.form_id != *form_id);
        Ok((before - state.responses.len()) as u64)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Create an in-memory store wrapped with operation tracing
pub fn create_memory_store() -> TracedStore<InMemoryFormStore> {
    TracedStore::new(InMemoryFormStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionType;
    use crate::types::ValidatedText;
    use serde_json::json;

    fn question(text: &str) -> Question {
        Question {
            id: QuestionId::new(),
            question_text: text.to_string(),
            question_type: QuestionType::Text,
            options: vec![],
            columns: vec![],
            rows: vec![],
        }
    }

    fn form(title: &str, description: &str, questions: Vec<Question>) -> Form {
        Form::new(
            ValidatedText::new("title", title).unwrap(),
            ValidatedText::new("description", description).unwrap(),
            questions,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_form_round_trip_preserves_question_order() -> Result<()> {
        let store = InMemoryFormStore::new();
        let first = question("First");
        let second = question("Second");
        store.insert_question(&second).await?;
        store.insert_question(&first).await?;

        let form = form("Survey", "Two questions", vec![first.clone(), second.clone()]);
        store.insert_form(&form).await?;

        let loaded = store.get_form(&form.id).await?.expect("form should exist");
        assert_eq!(loaded.questions, vec![first, second]);
        assert_eq!(loaded, form);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_form_with_unknown_question_fails() -> Result<()> {
        let store = InMemoryFormStore::new();
        let form = form("Survey", "Dangling", vec![question("Never stored")]);
        assert!(store.insert_form(&form).await.is_err());
        assert!(store.list_forms().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_search_matches_title_or_description() -> Result<()> {
        let store = InMemoryFormStore::new();
        store.insert_form(&form("Team Lunch", "Pick a place", vec![])).await?;
        store.insert_form(&form("Retro", "Sprint FEEDBACK", vec![])).await?;

        let query = ValidatedSearchQuery::new("feedback")?;
        let hits = store.search_forms(&query).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Retro");

        let query = ValidatedSearchQuery::new("nothing like this")?;
        assert!(store.search_forms(&query).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_share_token_is_assigned_once() -> Result<()> {
        let store = InMemoryFormStore::new();
        let form = form("Shared", "Form", vec![]);
        store.insert_form(&form).await?;

        let first = ShareToken::generate();
        let second = ShareToken::generate();
        let now = Utc::now();
        let assigned = store.ensure_form_share_token(&form.id, &first, now).await?;
        let reused = store.ensure_form_share_token(&form.id, &second, now).await?;
        assert_eq!(assigned, Some(first.clone()));
        assert_eq!(reused, Some(first.clone()));

        let resolved = store.get_form_by_share_token(&first).await?;
        assert_eq!(resolved.map(|f| f.id), Some(form.id));
        assert!(store.get_form_by_share_token(&second).await?.is_none());

        let missing = store
            .ensure_form_share_token(&FormId::new(), &second, now)
            .await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_rotate_response_token() -> Result<()> {
        let store = InMemoryFormStore::new();
        let form_id = FormId::new();
        let response = FormResponse::new(
            form_id,
            vec![crate::models::AnswerEntry {
                question_id: QuestionId::new(),
                answer: json!("yes"),
            }],
            Utc::now(),
        );
        store.insert_response(&response).await?;

        let next = ShareToken::generate();
        let rotated = store
            .rotate_response_token(&form_id, &response.token, &next, Utc::now())
            .await?
            .expect("response should match");
        assert_eq!(rotated.token, next);
        assert_eq!(rotated.id, response.id);

        assert!(store
            .get_response_by_token(&form_id, &response.token)
            .await?
            .is_none());
        assert!(store.get_response_by_token(&form_id, &next).await?.is_some());

        // Token belongs to a different form
        let other = store
            .rotate_response_token(&FormId::new(), &next, &ShareToken::generate(), Utc::now())
            .await?;
        assert!(other.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_responses_for_form_only_touches_that_form() -> Result<()> {
        let store = InMemoryFormStore::new();
        let kept_form = FormId::new();
        let doomed_form = FormId::new();
        for form_id in [kept_form, doomed_form, doomed_form] {
            store
                .insert_response(&FormResponse::new(form_id, vec![], Utc::now()))
                .await?;
        }

        assert_eq!(store.delete_responses_for_form(&doomed_form).await?, 2);
        assert_eq!(store.list_responses(&kept_form).await?.len(), 1);
        assert!(store.list_responses(&doomed_form).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() -> Result<()> {
        let store = InMemoryFormStore::new();
        store.close().await?;
        assert!(store.list_forms().await.is_err());
        Ok(())
    }
}
