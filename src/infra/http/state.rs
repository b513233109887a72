use std::sync::Arc;

use crate::application::auth::SessionManager;
use crate::application::posts::PostService;
use crate::application::uploads::UploadService;
use crate::infra::db::PostgresRepositories;
use crate::infra::memory::MemoryRepositories;

/// Backend probed by `/healthz`.
#[derive(Clone)]
pub enum HealthProbe {
    Postgres(Arc<PostgresRepositories>),
    Memory(Arc<MemoryRepositories>),
}

impl HealthProbe {
    pub fn backend(&self) -> &'static str {
        match self {
            HealthProbe::Postgres(_) => "postgres",
            HealthProbe::Memory(_) => "memory",
        }
    }

    pub async fn check(&self) -> Result<(), String> {
        match self {
            HealthProbe::Postgres(repos) => repos.health_check().await.map_err(|err| err.to_string()),
            HealthProbe::Memory(repos) => repos.health_check().await.map_err(|err| err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub posts: Arc<PostService>,
    pub uploads: Arc<UploadService>,
    pub health: HealthProbe,
}
