// Formbase - Form builder backend
// Root library module

pub mod config;
pub mod contracts;
pub mod error;
pub mod http_server;
pub mod http_types;
pub mod memory_storage;
pub mod models;
pub mod observability;
pub mod postgres_storage;
pub mod services;
pub mod types;
pub mod wrappers;

// Re-export key types
pub use observability::{
    get_metrics, init_logging, init_logging_with_level, log_operation, with_trace_id, Operation,
    OperationContext,
};

pub use contracts::FormStore;
pub use error::FormsError;

pub use models::{
    AnswerEntry, CreateFormRequest, Form, FormQuestionInput, FormResponse, NewQuestion, Question,
    QuestionType, ShareableLink, SubmitResponseRequest,
};

// Re-export validated types
pub use types::{FormId, QuestionId, ResponseId, ShareToken, ValidatedSearchQuery, ValidatedText};

// Storage implementations
pub use memory_storage::{create_memory_store, InMemoryFormStore};
pub use postgres_storage::{create_postgres_store, PostgresFormStore};
pub use wrappers::{into_shared_store, TracedStore};

// HTTP surface
pub use config::ServerConfig;
pub use http_server::{create_server, start_server};
pub use services::{FormService, FormsServices, QuestionService, ResponseService};
