use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::identity::IdentityVerifier;
use crate::auth::jwt::JwtManager;
use crate::auth::rate_limit::RateLimiter;
use crate::catalog::majors::MajorCatalog;
use crate::catalog::universities::UniversityCatalog;
use crate::config::Config;
use crate::cv::evaluator::CvEvaluator;
use crate::interview::service::InterviewService;
use crate::monitor::HealthMonitor;
use crate::rag::agent::CareerAgent;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub jwt: JwtManager,
    /// Verifies identity-provider ID tokens. Stubbed in tests.
    pub identity: Arc<dyn IdentityVerifier>,
    pub rate_limiter: RateLimiter,
    pub cv: Arc<CvEvaluator>,
    pub interviews: Arc<InterviewService>,
    pub universities: Arc<UniversityCatalog>,
    pub majors: Arc<MajorCatalog>,
    /// `None` until an LLM key is configured; career routes answer 503 meanwhile.
    pub career_agent: Option<Arc<CareerAgent>>,
    pub monitor: HealthMonitor,
}

#[cfg(test)]
impl AppState {
    /// In-memory database, no LLM, no identity provider, empty data directories.
    pub async fn for_tests() -> Self {
        use crate::auth::identity::testing::StaticVerifier;
        use crate::interview::catalog::InterviewCatalog;

        let config = Config::for_tests();
        let missing = std::env::temp_dir().join("compass-tests-no-data");
        AppState {
            db: crate::db::test_pool().await,
            jwt: JwtManager::new(
                &config.jwt_secret,
                config.jwt_access_ttl_secs,
                config.jwt_refresh_ttl_secs,
            ),
            identity: Arc::new(StaticVerifier::default()),
            rate_limiter: RateLimiter::in_memory(),
            cv: Arc::new(CvEvaluator::new(None)),
            interviews: Arc::new(InterviewService::new(InterviewCatalog::default(), None)),
            universities: Arc::new(UniversityCatalog::new(missing.join("school"))),
            majors: Arc::new(MajorCatalog::new(missing.join("job"))),
            career_agent: None,
            monitor: HealthMonitor::new(reqwest::Client::new(), vec![]),
            config,
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_interviews(mut self, interviews: InterviewService) -> Self {
        self.interviews = Arc::new(interviews);
        self
    }

    pub fn with_universities(mut self, universities: UniversityCatalog) -> Self {
        self.universities = Arc::new(universities);
        self
    }

    pub fn with_majors(mut self, majors: MajorCatalog) -> Self {
        self.majors = Arc::new(majors);
        self
    }

    pub fn with_career_agent(mut self, agent: Arc<CareerAgent>) -> Self {
        self.career_agent = Some(agent);
        self
    }

    pub fn with_monitor(mut self, monitor: HealthMonitor) -> Self {
        self.monitor = monitor;
        self
    }
}
