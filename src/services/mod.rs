// Services Layer - Form builder operations behind the HTTP routes
//
// Each service owns a handle to the shared store and turns loose request input
// into validated domain values. No service calls another; the HTTP layer picks
// the one it needs.

pub mod form_service;
pub mod question_service;
pub mod response_service;

pub use form_service::{FormDeletion, FormService};
pub use question_service::QuestionService;
pub use response_service::ResponseService;

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use url::Url;

use crate::contracts::FormStore;

/// All services built over one store and one public base URL
#[derive(Clone)]
pub struct FormsServices {
    pub questions: QuestionService,
    pub forms: FormService,
    pub responses: ResponseService,
}

impl FormsServices {
    pub fn new(store: Arc<dyn FormStore>, base_url: Url) -> Self {
        Self {
            questions: QuestionService::new(store.clone()),
            forms: FormService::new(store.clone(), base_url.clone()),
            responses: ResponseService::new(store, base_url),
        }
    }
}

/// Current time at the microsecond precision Postgres `TIMESTAMPTZ` keeps,
/// so a freshly returned record equals the same record read back later
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Append path segments to the frontend base URL, keeping any base path
pub(crate) fn frontend_link(base_url: &Url, segments: &[&str]) -> String {
    let mut link = base_url.as_str().trim_end_matches('/').to_string();
    for segment in segments {
        link.push('/');
        link.push_str(segment);
    }
    link
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_microsecond_precision() {
        for _ in 0..100 {
            assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
        }
    }

    #[test]
    fn test_frontend_link() {
        let base = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            frontend_link(&base, &["form", "abc"]),
            "http://localhost:3000/form/abc"
        );

        let nested = Url::parse("https://forms.example.com/app/").unwrap();
        assert_eq!(
            frontend_link(&nested, &["form", "f1", "response", "t1"]),
            "https://forms.example.com/app/form/f1/response/t1"
        );
    }
}
