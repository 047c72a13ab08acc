// ResponseService - Submission, retrieval and token rotation for responses
//
// Serves both the `/forms/...` and `/responses/...` route families.

use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

use super::form_service::parse_form_id;
use super::{frontend_link, now};
use crate::contracts::FormStore;
use crate::error::{FormsError, Result};
use crate::models::{FormResponse, ShareableLink, SubmitResponseRequest};
use crate::types::{FormId, ShareToken};

#[derive(Clone)]
pub struct ResponseService {
    store: Arc<dyn FormStore>,
    base_url: Url,
}

impl ResponseService {
    pub fn new(store: Arc<dyn FormStore>, base_url: Url) -> Self {
        Self { store, base_url }
    }

    /// Store a respondent's answers under a fresh access token.
    /// Answers are kept verbatim and are not checked against the form's questions.
    #[instrument(skip(self, request))]
    pub async fn submit_response(&self, request: SubmitResponseRequest) -> Result<FormResponse> {
        let raw_form_id = request
            .form_id
            .ok_or_else(|| FormsError::invalid("formId is required"))?;
        let form_id = parse_form_id(&raw_form_id)?;

        let answers = request
            .responses
            .into_iter()
            .enumerate()
            .map(|(position, answer)| answer.into_entry(position))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(FormsError::from_validation)?;

        self.ensure_form_exists(&form_id).await?;

        let response = FormResponse::new(form_id, answers, now());
        self.store.insert_response(&response).await?;
        info!(
            response_id = %response.id,
            form_id = %form_id,
            answers = response.responses.len(),
            "Response submitted"
        );
        Ok(response)
    }

    /// All responses of a form, oldest first. No responses is an empty list.
    pub async fn get_responses_by_form_id(&self, form_id: &str) -> Result<Vec<FormResponse>> {
        let form_id = parse_form_id(form_id)?;
        Ok(self.store.list_responses(&form_id).await?)
    }

    /// Replace the token of the response identified by `(form_id, token)` and
    /// return the link for the new one. The old token stops resolving.
    #[instrument(skip(self, token))]
    pub async fn rotate_share_token(&self, form_id: &str, token: &str) -> Result<ShareableLink> {
        let form_id = parse_form_id(form_id)?;
        self.ensure_form_exists(&form_id).await?;
        let current = parse_response_token(token)?;

        let next = ShareToken::generate();
        let rotated = self
            .store
            .rotate_response_token(&form_id, &current, &next, now())
            .await?
            .ok_or_else(|| FormsError::not_found("Response not found"))?;
        info!(response_id = %rotated.id, form_id = %form_id, "Response token rotated");

        let form_segment = form_id.to_string();
        Ok(ShareableLink {
            shareable_url: frontend_link(
                &self.base_url,
                &["form", &form_segment, "response", rotated.token.as_str()],
            ),
            token: rotated.token,
        })
    }

    pub async fn get_response_by_token(&self, form_id: &str, token: &str) -> Result<FormResponse> {
        let form_id = parse_form_id(form_id)?;
        let token = parse_response_token(token)?;
        self.store
            .get_response_by_token(&form_id, &token)
            .await?
            .ok_or_else(|| FormsError::not_found("Response not found"))
    }

    async fn ensure_form_exists(&self, form_id: &FormId) -> Result<()> {
        match self.store.get_form(form_id).await? {
            Some(_) => Ok(()),
            None => Err(FormsError::not_found("Form not found")),
        }
    }
}

/// A token that could never have been issued matches no response
fn parse_response_token(raw: &str) -> Result<ShareToken> {
    ShareToken::parse(raw).map_err(|_| FormsError::not_found("Response not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::InMemoryFormStore;
    use crate::models::{AnswerInput, Form};
    use crate::types::{QuestionId, ValidatedText};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> anyhow::Result<(ResponseService, Form)> {
        let store = Arc::new(InMemoryFormStore::new());
        let form = Form::new(
            ValidatedText::new("title", "Poll")?,
            ValidatedText::new("description", "Lunch poll")?,
            vec![],
            None,
            Utc::now(),
        );
        store.insert_form(&form).await?;
        let service = ResponseService::new(store, Url::parse("http://localhost:3000")?);
        Ok((service, form))
    }

    fn submission(form_id: &str, answers: Vec<AnswerInput>) -> SubmitResponseRequest {
        SubmitResponseRequest {
            form_id: Some(form_id.to_string()),
            responses: answers,
        }
    }

    fn answer(value: serde_json::Value) -> AnswerInput {
        AnswerInput {
            question_id: Some(QuestionId::new().to_string()),
            answer: Some(value),
        }
    }

    #[tokio::test]
    async fn test_submit_and_list_responses() -> anyhow::Result<()> {
        let (service, form) = setup().await?;
        let form_id = form.id.to_string();

        let first = service
            .submit_response(submission(&form_id, vec![answer(json!("Pizza"))]))
            .await?;
        let second = service
            .submit_response(submission(
                &form_id,
                vec![answer(json!(["Mon", "Fri"])), answer(json!({"Speed": "Good"}))],
            ))
            .await?;

        assert_ne!(first.token, second.token);
        let listed = service.get_responses_by_form_id(&form_id).await?;
        assert_eq!(listed, vec![first, second]);
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_validation() -> anyhow::Result<()> {
        let (service, form) = setup().await?;

        let missing_form = service
            .submit_response(SubmitResponseRequest::default())
            .await
            .unwrap_err();
        assert_eq!(missing_form.to_string(), "formId is required");

        let unknown_form = service
            .submit_response(submission(&FormId::new().to_string(), vec![]))
            .await
            .unwrap_err();
        assert!(unknown_form.is_not_found());

        let null_answer = service
            .submit_response(submission(
                &form.id.to_string(),
                vec![answer(json!("ok")), answer(serde_json::Value::Null)],
            ))
            .await
            .unwrap_err();
        assert_eq!(null_answer.to_string(), "Response #2 is missing an answer");
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_unknown_form_is_empty() -> anyhow::Result<()> {
        let (service, _) = setup().await?;
        let listed = service
            .get_responses_by_form_id(&FormId::new().to_string())
            .await?;
        assert!(listed.is_empty());
        assert!(service
            .get_responses_by_form_id("nope")
            .await
            .unwrap_err()
            .is_invalid_input());
        Ok(())
    }

    #[tokio::test]
    async fn test_rotating_twice_only_latest_token_resolves() -> anyhow::Result<()> {
        let (service, form) = setup().await?;
        let form_id = form.id.to_string();
        let submitted = service
            .submit_response(submission(&form_id, vec![answer(json!("Tacos"))]))
            .await?;

        let first = service
            .rotate_share_token(&form_id, submitted.token.as_str())
            .await?;
        let second = service
            .rotate_share_token(&form_id, first.token.as_str())
            .await?;

        assert_ne!(first.token, second.token);
        assert_eq!(
            second.shareable_url,
            format!("http://localhost:3000/form/{form_id}/response/{}", second.token)
        );

        for stale in [&submitted.token, &first.token] {
            let err = service
                .get_response_by_token(&form_id, stale.as_str())
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
        let latest = service
            .get_response_by_token(&form_id, second.token.as_str())
            .await?;
        assert_eq!(latest.id, submitted.id);
        assert_eq!(latest.responses, submitted.responses);
        Ok(())
    }

    #[tokio::test]
    async fn test_rotate_requires_matching_form_and_token() -> anyhow::Result<()> {
        let (service, form) = setup().await?;
        let form_id = form.id.to_string();

        let unknown_form = service
            .rotate_share_token(
                &FormId::new().to_string(),
                ShareToken::generate().as_str(),
            )
            .await
            .unwrap_err();
        assert_eq!(unknown_form.to_string(), "Form not found");

        let unknown_token = service
            .rotate_share_token(&form_id, ShareToken::generate().as_str())
            .await
            .unwrap_err();
        assert_eq!(unknown_token.to_string(), "Response not found");
        Ok(())
    }

    #[tokio::test]
    async fn test_unissuable_tokens_are_not_found() -> anyhow::Result<()> {
        let (service, form) = setup().await?;
        let form_id = form.id.to_string();

        for token in ["legacy-token", "abc", ""] {
            let err = service
                .get_response_by_token(&form_id, token)
                .await
                .unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.to_string(), "Response not found");

            let err = service
                .rotate_share_token(&form_id, token)
                .await
                .unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.to_string(), "Response not found");
        }

        // The form is checked before the token
        let err = service
            .rotate_share_token(&FormId::new().to_string(), "legacy-token")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Form not found");
        Ok(())
    }

    #[tokio::test]
    async fn test_response_timestamps_survive_storage_precision() -> anyhow::Result<()> {
        let (service, form) = setup().await?;
        let form_id = form.id.to_string();
        let submitted = service
            .submit_response(submission(&form_id, vec![answer(json!("Ramen"))]))
            .await?;
        assert_eq!(submitted.created_at.timestamp_subsec_nanos() % 1_000, 0);

        let link = service
            .rotate_share_token(&form_id, submitted.token.as_str())
            .await?;
        let rotated = service
            .get_response_by_token(&form_id, link.token.as_str())
            .await?;
        assert_eq!(rotated.updated_at.timestamp_subsec_nanos() % 1_000, 0);
        Ok(())
    }
}
