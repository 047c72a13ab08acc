// Storage Contracts
// The single persistence seam of the system. Services only ever talk to a
// `FormStore`; Postgres and in-memory implementations sit behind it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Form, FormResponse, Question};
use crate::types::{FormId, QuestionId, ShareToken, ValidatedSearchQuery};

/// Core trait for question, form and response persistence
///
/// Every method is a single storage step. Nothing here spans entities: a form
/// delete and the removal of its responses are two separate calls.
#[async_trait]
pub trait FormStore: Send + Sync {
    /// Persist a new question
    ///
    /// # Preconditions
    /// - Question id is unique
    ///
    /// # Postconditions
    /// - Question appears in `list_questions` after all previously inserted ones
    async fn insert_question(&self, question: &Question) -> Result<()>;

    /// Retrieve a question by id
    async fn get_question(&self, id: &QuestionId) -> Result<Option<Question>>;

    /// All questions, oldest first
    async fn list_questions(&self) -> Result<Vec<Question>>;

    /// Persist a new form
    ///
    /// # Preconditions
    /// - Every question on the form already exists in the store
    ///
    /// # Postconditions
    /// - Only the ordered question ids are stored; reads hydrate them again
    async fn insert_form(&self, form: &Form) -> Result<()>;

    /// Retrieve a form with its questions in order
    async fn get_form(&self, id: &FormId) -> Result<Option<Form>>;

    /// All forms, oldest first
    async fn list_forms(&self) -> Result<Vec<Form>>;

    /// Forms whose title or description contains the query, ignoring case
    ///
    /// # Postconditions
    /// - Empty result for no matches (callers decide what that means)
    async fn search_forms(&self, query: &ValidatedSearchQuery) -> Result<Vec<Form>>;

    /// Delete a form and its question links
    ///
    /// # Postconditions
    /// - Returns false if the form did not exist
    /// - Questions themselves and responses are left untouched
    async fn delete_form(&self, id: &FormId) -> Result<bool>;

    /// Return the form's share token, assigning `candidate` if it has none yet
    ///
    /// # Postconditions
    /// - Returns None if the form does not exist
    /// - An existing token is never replaced
    /// - `updated_at` moves to `now` only when a token is assigned
    async fn ensure_form_share_token(
        &self,
        id: &FormId,
        candidate: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<ShareToken>>;

    /// Resolve a form share token back to its form
    async fn get_form_by_share_token(&self, token: &ShareToken) -> Result<Option<Form>>;

    /// Persist a new response
    ///
    /// # Preconditions
    /// - Token is unique across all responses
    async fn insert_response(&self, response: &FormResponse) -> Result<()>;

    /// All responses for a form, oldest first. Empty if there are none.
    async fn list_responses(&self, form_id: &FormId) -> Result<Vec<FormResponse>>;

    /// The response matching both the form and the token
    async fn get_response_by_token(
        &self,
        form_id: &FormId,
        token: &ShareToken,
    ) -> Result<Option<FormResponse>>;

    /// Replace the token of the response matching `(form_id, current)`
    ///
    /// # Postconditions
    /// - Returns None if no response matched; nothing is modified then
    /// - `current` no longer resolves, `next` does
    async fn rotate_response_token(
        &self,
        form_id: &FormId,
        current: &ShareToken,
        next: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<FormResponse>>;

    /// Delete every response of a form, returning how many were removed
    async fn delete_responses_for_form(&self, form_id: &FormId) -> Result<u64>;

    /// Release underlying resources. The store must not be used afterwards.
    async fn close(&self) -> Result<()>;
}
