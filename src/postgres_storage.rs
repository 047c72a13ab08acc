// Postgres Storage Implementation
// FormStore over a sqlx connection pool. Forms keep only ordered question ids in
// `form_questions`; reads hydrate the full questions with one extra query.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::contracts::FormStore;
use crate::models::{AnswerEntry, Form, FormResponse, Question};
use crate::types::{FormId, QuestionId, ResponseId, ShareToken, ValidatedSearchQuery};
use crate::wrappers::TracedStore;

/// Idempotent schema, applied statement by statement at startup.
/// `responses.form_id` deliberately has no foreign key: the cascade from a
/// deleted form is a separate call.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        seq BIGINT GENERATED ALWAYS AS IDENTITY,
        id UUID PRIMARY KEY,
        question_text TEXT NOT NULL,
        question_type TEXT NOT NULL,
        options TEXT[] NOT NULL DEFAULT '{}',
        grid_columns TEXT[] NOT NULL DEFAULT '{}',
        grid_rows TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS forms (
        seq BIGINT GENERATED ALWAYS AS IDENTITY,
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        header_image TEXT NOT NULL DEFAULT '',
        share_token TEXT UNIQUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS form_questions (
        form_id UUID NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        question_id UUID NOT NULL REFERENCES questions(id),
        PRIMARY KEY (form_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS responses (
        seq BIGINT GENERATED ALWAYS AS IDENTITY,
        id UUID PRIMARY KEY,
        form_id UUID NOT NULL,
        answers JSONB NOT NULL,
        token TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS responses_form_id_idx ON responses (form_id)",
];

#[derive(Debug, Clone, sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    question_text: String,
    question_type: String,
    options: Vec<String>,
    grid_columns: Vec<String>,
    grid_rows: Vec<String>,
}

impl QuestionRow {
    fn into_question(self) -> Result<Question> {
        Ok(Question {
            id: QuestionId::from_uuid(self.id)?,
            question_type: self
                .question_type
                .parse()
                .with_context(|| format!("question {} has a corrupt type", self.id))?,
            question_text: self.question_text,
            options: self.options,
            columns: self.grid_columns,
            rows: self.grid_rows,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FormRow {
    id: Uuid,
    title: String,
    description: String,
    header_image: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A question joined through `form_questions`, tagged with its form
#[derive(Debug, Clone, sqlx::FromRow)]
struct FormQuestionRow {
    form_id: Uuid,
    #[sqlx(flatten)]
    question: QuestionRow,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ResponseRow {
    id: Uuid,
    form_id: Uuid,
    answers: Json<Vec<AnswerEntry>>,
    token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResponseRow {
    fn into_response(self) -> Result<FormResponse> {
        Ok(FormResponse {
            id: ResponseId::from_uuid(self.id)?,
            form_id: FormId::from_uuid(self.form_id)?,
            responses: self.answers.0,
            token: ShareToken::parse(&self.token)
                .with_context(|| format!("response {} has a corrupt token", self.id))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const FORM_COLUMNS: &str = "id, title, description, header_image, created_at, updated_at";
const RESPONSE_COLUMNS: &str = "id, form_id, answers, token, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresFormStore {
    pool: PgPool,
}

impl PostgresFormStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        info!(max_connections, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Create tables and indexes if they do not exist yet
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to apply schema")?;
        }
        Ok(())
    }

    /// Attach questions to form rows, keeping row order and question positions
    async fn hydrate(&self, rows: Vec<FormRow>) -> Result<Vec<Form>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let linked = sqlx::query_as::<_, FormQuestionRow>(
            r#"
            SELECT
                fq.form_id,
                q.id,
                q.question_text,
                q.question_type,
                q.options,
                q.grid_columns,
                q.grid_rows
            FROM form_questions fq
            JOIN questions q ON q.id = fq.question_id
            WHERE fq.form_id = ANY($1)
            ORDER BY fq.form_id, fq.position
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .context("failed to load form questions")?;

        let mut by_form: HashMap<Uuid, Vec<Question>> = HashMap::new();
        for row in linked {
            by_form
                .entry(row.form_id)
                .or_default()
                .push(row.question.into_question()?);
        }

        rows.into_iter()
            .map(|row| {
                Ok(Form {
                    id: FormId::from_uuid(row.id)?,
                    questions: by_form.remove(&row.id).unwrap_or_default(),
                    title: row.title,
                    description: row.description,
                    header_image: row.header_image,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<FormRow>) -> Result<Option<Form>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FormStore for PostgresFormStore {
    #[instrument(skip(self, question), fields(question_id = %question.id))]
    async fn insert_question(&self, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, question_text, question_type, options, grid_columns, grid_rows)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(question.id.as_uuid())
        .bind(&question.question_text)
        .bind(question.question_type.as_str())
        .bind(question.options.as_slice())
        .bind(question.columns.as_slice())
        .bind(question.rows.as_slice())
        .execute(&self.pool)
        .await
        .context("failed to insert question")?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_question(&self, id: &QuestionId) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question_text, question_type, options, grid_columns, grid_rows
            FROM questions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch question")?;
        row.map(QuestionRow::into_question).transpose()
    }

    #[instrument(skip(self))]
    async fn list_questions(&self) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question_text, question_type, options, grid_columns, grid_rows
            FROM questions
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list questions")?;
        rows.into_iter().map(QuestionRow::into_question).collect()
    }

    #[instrument(skip(self, form), fields(form_id = %form.id))]
    async fn insert_form(&self, form: &Form) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO forms (id, title, description, header_image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(form.id.as_uuid())
        .bind(&form.title)
        .bind(&form.description)
        .bind(&form.header_image)
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(&mut *tx)
        .await
        .context("failed to insert form")?;

        for (position, question_id) in form.question_ids().into_iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO form_questions (form_id, position, question_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(form.id.as_uuid())
            .bind(position as i32)
            .bind(question_id.as_uuid())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to link question {question_id} to form"))?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_form(&self, id: &FormId) -> Result<Option<Form>> {
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch form")?;
        self.hydrate_one(row).await
    }

    #[instrument(skip(self))]
    async fn list_forms(&self) -> Result<Vec<Form>> {
        let rows = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms ORDER BY seq"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list forms")?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self), fields(query = %query.as_str()))]
    async fn search_forms(&self, query: &ValidatedSearchQuery) -> Result<Vec<Form>> {
        let rows = sqlx::query_as::<_, FormRow>(&format!(
            r#"
            SELECT {FORM_COLUMNS}
            FROM forms
            WHERE title ILIKE $1 ESCAPE '\' OR description ILIKE $1 ESCAPE '\'
            ORDER BY seq
            "#
        ))
        .bind(query.like_pattern())
        .fetch_all(&self.pool)
        .await
        .context("failed to search forms")?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn delete_form(&self, id: &FormId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .context("failed to delete form")?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, candidate))]
    async fn ensure_form_share_token(
        &self,
        id: &FormId,
        candidate: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<ShareToken>> {
        let token = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE forms
            SET share_token = COALESCE(share_token, $2),
                updated_at = CASE WHEN share_token IS NULL THEN $3 ELSE updated_at END
            WHERE id = $1
            RETURNING share_token
            "#,
        )
        .bind(id.as_uuid())
        .bind(candidate.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("failed to assign form share token")?;
        token.map(|t| ShareToken::parse(&t)).transpose()
    }

    #[instrument(skip(self, token))]
    async fn get_form_by_share_token(&self, token: &ShareToken) -> Result<Option<Form>> {
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE share_token = $1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to resolve form share token")?;
        self.hydrate_one(row).await
    }

    #[instrument(skip(self, response), fields(response_id = %response.id, form_id = %response.form_id))]
    async fn insert_response(&self, response: &FormResponse) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (id, form_id, answers, token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(response.id.as_uuid())
        .bind(response.form_id.as_uuid())
        .bind(Json(response.responses.clone()))
        .bind(response.token.as_str())
        .bind(response.created_at)
        .bind(response.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert response")?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_responses(&self, form_id: &FormId) -> Result<Vec<FormResponse>> {
        let rows = sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM responses WHERE form_id = $1 ORDER BY seq"
        ))
        .bind(form_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .context("failed to list responses")?;
        rows.into_iter().map(ResponseRow::into_response).collect()
    }

    #[instrument(skip(self, token))]
    async fn get_response_by_token(
        &self,
        form_id: &FormId,
        token: &ShareToken,
    ) -> Result<Option<FormResponse>> {
        let row = sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM responses WHERE form_id = $1 AND token = $2"
        ))
        .bind(form_id.as_uuid())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch response by token")?;
        row.map(ResponseRow::into_response).transpose()
    }

    #[instrument(skip(self, current, next))]
    async fn rotate_response_token(
        &self,
        form_id: &FormId,
        current: &ShareToken,
        next: &ShareToken,
        now: DateTime<Utc>,
    ) -> Result<Option<FormResponse>> {
        let row = sqlx::query_as::<_, ResponseRow>(&format!(
            r#"
            UPDATE responses
            SET token = $3, updated_at = $4
            WHERE form_id = $1 AND token = $2
            RETURNING {RESPONSE_COLUMNS}
            "#
        ))
        .bind(form_id.as_uuid())
        .bind(current.as_str())
        .bind(next.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("failed to rotate response token")?;
        row.map(ResponseRow::into_response).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_responses_for_form(&self, form_id: &FormId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM responses WHERE form_id = $1")
            .bind(form_id.as_uuid())
            .execute(&self.pool)
            .await
            .context("failed to delete form responses")?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Postgres pool closed");
        Ok(())
    }
}

/// Connect, apply the schema and wrap the store with operation tracing
pub async fn create_postgres_store(
    database_url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<TracedStore<PostgresFormStore>> {
    let store = PostgresFormStore::connect(database_url, max_connections, connect_timeout).await?;
    store.ensure_schema().await?;
    Ok(TracedStore::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionType;
    use serde_json::json;

    #[test]
    fn test_question_row_conversion() {
        let id = Uuid::new_v4();
        let question = QuestionRow {
            id,
            question_text: "Rate us".into(),
            question_type: "Grid".into(),
            options: vec![],
            grid_columns: vec!["1".into(), "2".into()],
            grid_rows: vec!["Speed".into()],
        }
        .into_question()
        .unwrap();

        assert_eq!(question.id.as_uuid(), id);
        assert_eq!(question.question_type, QuestionType::Grid);
        assert_eq!(question.columns, vec!["1", "2"]);
        assert_eq!(question.rows, vec!["Speed"]);
    }

    #[test]
    fn test_corrupt_question_type_is_an_error() {
        let row = QuestionRow {
            id: Uuid::new_v4(),
            question_text: "?".into(),
            question_type: "Dropdown".into(),
            options: vec![],
            grid_columns: vec![],
            grid_rows: vec![],
        };
        let err = row.into_question().unwrap_err();
        assert!(format!("{err:#}").contains("corrupt type"));
    }

    #[test]
    fn test_response_row_conversion() {
        let token = ShareToken::generate();
        let question_id = QuestionId::new();
        let now = Utc::now();
        let response = ResponseRow {
            id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            answers: Json(vec![AnswerEntry {
                question_id,
                answer: json!({"Speed": "2"}),
            }]),
            token: token.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
        .into_response()
        .unwrap();

        assert_eq!(response.token, token);
        assert_eq!(response.responses[0].question_id, question_id);
    }

    #[test]
    fn test_schema_is_idempotent() {
        for statement in SCHEMA {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }
}
