// QuestionService - Create and list reusable questions

use std::sync::Arc;
use tracing::{info, instrument};

use crate::contracts::FormStore;
use crate::error::{FormsError, Result};
use crate::models::{NewQuestion, Question};

#[derive(Clone)]
pub struct QuestionService {
    store: Arc<dyn FormStore>,
}

impl QuestionService {
    pub fn new(store: Arc<dyn FormStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a question.
    ///
    /// Grid layout is not enforced here, only when the question is placed on a form.
    #[instrument(skip(self, request))]
    pub async fn create_question(&self, request: NewQuestion) -> Result<Question> {
        let question = request
            .into_question(false)
            .map_err(FormsError::from_validation)?;
        self.store.insert_question(&question).await?;
        info!(question_id = %question.id, question_type = %question.question_type, "Question created");
        Ok(question)
    }

    pub async fn list_questions(&self) -> Result<Vec<Question>> {
        Ok(self.store.list_questions().await?)
    }
}
