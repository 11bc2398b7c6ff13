use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use truthwatch_core::config::{AppConfig, ConfigError, LoadOptions};
use truthwatch_core::monitor::{MonitorPoller, MonitorStore, MonitorTask, StoreError};
use truthwatch_core::source::SourceError;
use truthwatch_core::CooldownTracker;
use truthwatch_db::{connect_from_config, migrations, DbPool, SqlMonitorRepository};
use truthwatch_discord::events::command_dispatcher;
use truthwatch_discord::gateway::{
    GatewayLatency, GatewayRunner, NoopGatewayTransport, ReconnectPolicy,
};
use truthwatch_discord::rest::{ChannelMessenger, DiscordRestClient, MessengerError, RestSettings};
use truthwatch_scraper::{ApifyClient, ApifySettings};

use crate::alerts::{AlertChannels, ChannelAlertSink};
use crate::health::HealthState;
use crate::service::{BotServices, DiscordCommandService};

/// Everything the bot process owns, wired once at startup.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<dyn MonitorStore>,
    pub monitor: Arc<MonitorTask>,
    pub gateway: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("scraper client setup failed: {0}")]
    Scraper(#[source] SourceError),
    #[error("discord client setup failed: {0}")]
    Messenger(#[source] MessengerError),
    #[error("monitor state could not be read: {0}")]
    Store(#[source] StoreError),
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState {
            db_pool: self.db_pool.clone(),
            store: Arc::clone(&self.store),
            monitor: Arc::clone(&self.monitor),
        }
    }

    /// Restarts the poller when a configuration was left active by a previous
    /// run. Returns whether the loop is running afterwards.
    pub async fn resume_monitoring(&self) -> Result<bool, BootstrapError> {
        if !self.store.is_active().await.map_err(BootstrapError::Store)? {
            return Ok(self.monitor.is_started());
        }
        let spawned = self.monitor.ensure_started();
        info!(
            event_name = "system.bootstrap.monitoring_resumed",
            correlation_id = "bootstrap",
            spawned,
            "active monitoring configuration found; poller running"
        );
        Ok(true)
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_from_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store: Arc<dyn MonitorStore> = Arc::new(SqlMonitorRepository::new(db_pool.clone()));
    let source = Arc::new(
        ApifyClient::new(ApifySettings::from(&config.scraper)).map_err(BootstrapError::Scraper)?,
    );
    let messenger: Arc<dyn ChannelMessenger> = Arc::new(
        DiscordRestClient::new(RestSettings::new(config.discord.bot_token.clone()))
            .map_err(BootstrapError::Messenger)?,
    );

    let alert_channels = Arc::new(AlertChannels::new(config.discord.alert_channel_ids.clone()));
    let sink = Arc::new(ChannelAlertSink::new(Arc::clone(&alert_channels), Arc::clone(&messenger)));
    let monitor = Arc::new(MonitorTask::new(MonitorPoller::new(
        Arc::clone(&store),
        source.clone(),
        sink,
        config.monitor.poller_settings(),
    )));

    let service = DiscordCommandService::new(
        BotServices {
            source,
            store: Arc::clone(&store),
            monitor: Arc::clone(&monitor),
            cooldown: Arc::new(CooldownTracker::new(config.search.cooldown_policy())),
            alert_channels,
            latency: GatewayLatency::default(),
        },
        config.search.clone(),
        config.scraper.max_posts,
        &config.discord.command_prefix,
    );
    let gateway = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        command_dispatcher(service, &config.discord.command_prefix),
        messenger,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, db_pool, store, monitor, gateway })
}

#[cfg(test)]
mod tests {
    use truthwatch_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                discord_bot_token: Some("discord-test-token".to_string()),
                scraper_api_token: Some("apify_api_test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_prefixed_bot_token() {
        let mut options = valid_overrides("sqlite::memory:");
        options.overrides.discord_bot_token = Some("Bot abc".to_string());

        let message = bootstrap(options).await.err().expect("error").to_string();
        assert!(message.contains("discord.bot_token"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_resumes_active_monitoring() {
        let app = bootstrap(valid_overrides("sqlite::memory:")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'monitoring_configs'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("monitoring table after bootstrap");
        assert_eq!(table_count, 1);

        assert!(!app.resume_monitoring().await.expect("resume"), "nothing active yet");
        assert!(!app.monitor.is_started());

        app.store.add_config("someone", "border").await.expect("add");
        assert!(app.resume_monitoring().await.expect("resume"));
        assert!(app.monitor.is_started());

        let health = app.health_state();
        assert!(health.monitor.is_started());
    }
}
