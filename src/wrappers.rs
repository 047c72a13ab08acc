// Wrapper Components
// Decorators over any FormStore. TracedStore gives every store call a trace id,
// timing, and a typed operation log entry.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::contracts::FormStore;
use crate::models::{Form, FormResponse, Question};
use crate::observability::*;
use crate::types::{FormId, QuestionId, ShareToken, ValidatedSearchQuery};

/// Store wrapper that adds automatic tracing to all operations
pub struct TracedStore<S: FormStore> {
    inner: S,
    trace_id: Uuid,
    operation_count: AtomicU64,
}

impl<S: FormStore> TracedStore<S> {
    /// Wrap a store implementation with tracing
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            trace_id: Uuid::new_v4(),
            operation_count: AtomicU64::new(0),
        }
    }

    /// Get the trace ID shared by every operation on this store
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Get the number of operations performed
    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn record(&self, name: &str, op: Operation) {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        let mut ctx = OperationContext::new(name);
        ctx.add_attribute("store_trace_id", self.trace_id.to_string());
        log_operation(&ctx, &op, &Ok(()));
    }
}

#[async_trait]
impl<S: FormStore> FormStore for TracedStore<S> {
    async fn insert_question(&self, question: &Question) -> Result<()> {
        with_trace_id("store.insert_question", async {
            self.inner.insert_question(question).await?;
            self.record(
                "store.insert_question",
                Operation::StoreWrite {
                    entity: "question",
                    key: question.id.to_string(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn get_question(&self, id: &QuestionId) -> Result<Option<Question>> {
        with_trace_id("store.get_question", async {
            let question = self.inner.get_question(id).await?;
            self.record(
                "store.get_question",
                Operation::StoreRead {
                    entity: "question",
                    key: id.to_string(),
                },
            );
            Ok(question)
        })
        .await
    }

    async fn list_questions(&self) -> Result<Vec<Question>> {
        with_trace_id("store.list_questions", async {
            let questions = self.inner.list_questions().await?;
            self.record(
                "store.list_questions",
                Operation::StoreRead {
                    entity: "question",
                    key: "*".to_string(),
                },
            );
            Ok(questions)
        })
        .await
    }

    async fn insert_form(&self, form: &Form) -> Result<()> {
        with_trace_id("store.insert_form", async {
            self.inner.insert_form(form).await?;
            self.record(
                "store.insert_form",
                Operation::StoreWrite {
                    entity: "form",
                    key: form.id.to_string(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn get_form(&self, id: &FormId) -> Result<Option<Form>> {
        with_trace_id("store.get_form", async {
            let form = self.inner.get_form(id).await?;
            self.record(
                "store.get_form",
                Operation::StoreRead {
                    entity: "form",
                    key: id.to_string(),
                },
            );
            Ok(form)
        })
        .await
    }

    async fn list_forms(&self) -> Result<Vec<Form>> {
        with_trace_id("store.list_forms", async {
            let forms = self.inner.list_forms().await?;
            self.record(
                "store.list_forms",
                Operation::StoreRead {
                    entity: "form",
                    key: "*".to_string(),
                },
            );
            Ok(forms)
        })
        .await
    }

    async fn search_forms(&self, query: &ValidatedSearchQuery) -> Result<Vec<Form>> {
        with_trace_id("store.search_forms", async {
            let forms = self.inner.search_forms(query).await?;
            self.record(
                "store.search_forms",
                Operation::Search {
                    query: query.as_str().to_string(),
                    result_count: forms.len(),
                },
            );
            Ok(forms)
        })
        .await
    }

    async fn delete_form(&self, id: &FormId) -> Result<bool> {
        with_trace_id("store.delete_form", async {
            let deleted = self.inner.delete_form(id).await?;
            self.record(
                "store.delete_form",
                Operation::StoreDelete {
                    entity: "form",
                    key: id.to_string(),
                    removed: u64::from(deleted),
                },
            );
            Ok(deleted)
        })
        .await
    }

    async fn ensure_form_share_token(
        &self,
        id: &FormId,
        candidate: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<ShareToken>> {
        with_trace_id("store.ensure_form_share_token", async {
            let token = self.inner.ensure_form_share_token(id, candidate, now).await?;
            if token.as_ref() == Some(candidate) {
                self.record(
                    "store.ensure_form_share_token",
                    Operation::TokenAssigned {
                        entity: "form",
                        key: id.to_string(),
                    },
                );
            }
            Ok(token)
        })
        .await
    }

    async fn get_form_by_share_token(&self, token: &ShareToken) -> Result<Option<Form>> {
        with_trace_id("store.get_form_by_share_token", async {
            let form = self.inner.get_form_by_share_token(token).await?;
            self.record(
                "store.get_form_by_share_token",
                Operation::StoreRead {
                    entity: "form",
                    key: "share_token".to_string(),
                },
            );
            Ok(form)
        })
        .await
    }

    async fn insert_response(&self, response: &FormResponse) -> Result<()> {
        with_trace_id("store.insert_response", async {
            self.inner.insert_response(response).await?;
            self.record(
                "store.insert_response",
                Operation::StoreWrite {
                    entity: "response",
                    key: response.id.to_string(),
                },
            );
            Ok(())
        })
        .await
    }

    async fn list_responses(&self, form_id: &FormId) -> Result<Vec<FormResponse>> {
        with_trace_id("store.list_responses", async {
            let responses = self.inner.list_responses(form_id).await?;
            self.record(
                "store.list_responses",
                Operation::StoreRead {
                    entity: "response",
                    key: form_id.to_string(),
                },
            );
            Ok(responses)
        })
        .await
    }

    async fn get_response_by_token(
        &self,
        form_id: &FormId,
        token: &ShareToken,
    ) -> Result<Option<FormResponse>> {
        with_trace_id("store.get_response_by_token", async {
            let response = self.inner.get_response_by_token(form_id, token).await?;
            self.record(
                "store.get_response_by_token",
                Operation::StoreRead {
                    entity: "response",
                    key: form_id.to_string(),
                },
            );
            Ok(response)
        })
        .await
    }

    async fn rotate_response_token(
        &self,
        form_id: &FormId,
        current: &ShareToken,
        next: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<FormResponse>> {
        with_trace_id("store.rotate_response_token", async {
            let rotated = self
                .inner
                .rotate_response_token(form_id, current, next, now)
                .await?;
            if let Some(response) = &rotated {
                self.record(
                    "store.rotate_response_token",
                    Operation::TokenAssigned {
                        entity: "response",
                        key: response.id.to_string(),
                    },
                );
            }
            Ok(rotated)
        })
        .await
    }

    async fn delete_responses_for_form(&self, form_id: &FormId) -> Result<u64> {
        with_trace_id("store.delete_responses_for_form", async {
            let removed = self.inner.delete_responses_for_form(form_id).await?;
            self.record(
                "store.delete_responses_for_form",
                Operation::StoreDelete {
                    entity: "response",
                    key: form_id.to_string(),
                    removed,
                },
            );
            Ok(removed)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        with_trace_id("store.close", async {
            self.inner.close().await?;
            self.record(
                "store.close",
                Operation::Shutdown {
                    reason: "store closed".to_string(),
                },
            );
            Ok(())
        })
        .await
    }
}

/// Erase the concrete store type behind an `Arc<dyn FormStore>`
pub fn into_shared_store<S: FormStore + 'static>(store: S) -> Arc<dyn FormStore> {
    Arc::new(store)
}
