use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use truthwatch_core::monitor::{MonitorStore, MonitorTask};
use truthwatch_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub store: Arc<dyn MonitorStore>,
    pub monitor: Arc<MonitorTask>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonitoringHealth {
    pub status: &'static str,
    pub loop_started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub monitoring: MonitoringHealth,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let monitoring = monitoring_check(&state).await;
    let ready = database.status == "ready" && monitoring.status != "degraded";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "truthwatch-bot runtime initialized".to_string(),
        },
        database,
        monitoring,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn monitoring_check(state: &HealthState) -> MonitoringHealth {
    let loop_started = state.monitor.is_started();
    match state.store.active_config().await {
        Ok(Some(config)) => MonitoringHealth {
            status: "active",
            loop_started,
            username: Some(config.target),
            keyword: Some(config.keyword),
            last_checked_at: config.last_checked_at.map(|at| at.to_rfc3339()),
        },
        Ok(None) => MonitoringHealth {
            status: "idle",
            loop_started,
            username: None,
            keyword: None,
            last_checked_at: None,
        },
        Err(_) => MonitoringHealth {
            status: "degraded",
            loop_started,
            username: None,
            keyword: None,
            last_checked_at: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use truthwatch_core::domain::post::Post;
    use truthwatch_core::domain::profile::Profile;
    use truthwatch_core::monitor::{
        AlertError, AlertSink, MonitorPoller, MonitorStore, MonitorTask, PollerSettings, PostAlert,
    };
    use truthwatch_core::source::{PostSource, SourceError};
    use truthwatch_db::migrations::run_pending;
    use truthwatch_db::{connect_with_settings, SqlMonitorRepository};

    use crate::health::{health, HealthState};

    struct NoPosts;

    #[async_trait]
    impl PostSource for NoPosts {
        async fn fetch_profile(&self, target: &str) -> Result<Profile, SourceError> {
            Err(SourceError::NotFound(target.to_owned()))
        }

        async fn fetch_posts(&self, _target: &str, _limit: usize) -> Result<Vec<Post>, SourceError> {
            Ok(Vec::new())
        }
    }

    struct Discard;

    #[async_trait]
    impl AlertSink for Discard {
        async fn emit(&self, _alert: &PostAlert) -> Result<(), AlertError> {
            Ok(())
        }
    }

    async fn state() -> HealthState {
        let db_pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        run_pending(&db_pool).await.expect("migrations");
        let store: Arc<dyn MonitorStore> = Arc::new(SqlMonitorRepository::new(db_pool.clone()));
        let monitor = Arc::new(MonitorTask::new(MonitorPoller::new(
            Arc::clone(&store),
            Arc::new(NoPosts),
            Arc::new(Discard),
            PollerSettings { interval: Duration::from_secs(300), fetch_limit: 20 },
        )));
        HealthState { db_pool, store, monitor }
    }

    #[tokio::test]
    async fn health_reports_idle_then_active_monitoring() {
        let state = state().await;

        let (status, Json(payload)) = health(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.monitoring.status, "idle");
        assert!(!payload.monitoring.loop_started);

        state.store.add_config("someone", "border").await.expect("add");
        let (_, Json(payload)) = health(State(state.clone())).await;
        assert_eq!(payload.monitoring.status, "active");
        assert_eq!(payload.monitoring.username.as_deref(), Some("someone"));
        assert_eq!(payload.monitoring.keyword.as_deref(), Some("border"));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let state = state().await;
        state.db_pool.close().await;

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.monitoring.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
