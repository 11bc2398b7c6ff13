use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use truthwatch_core::config::SearchConfig;
use truthwatch_core::domain::monitor::MonitorConfigId;
use truthwatch_core::monitor::{AddOutcome, MonitorStore, MonitorTask};
use truthwatch_core::source::PostSource;
use truthwatch_core::{filter_posts, ApplicationError, CooldownTracker, InterfaceError};
use truthwatch_discord::commands::{BotCommandService, CommandEnvelope, SearchRequest};
use truthwatch_discord::embeds::{self, MessageTemplate, SearchSummary};
use truthwatch_discord::gateway::GatewayLatency;

use crate::alerts::AlertChannels;

/// Collaborators shared by every command handler.
pub struct BotServices {
    pub source: Arc<dyn PostSource>,
    pub store: Arc<dyn MonitorStore>,
    pub monitor: Arc<MonitorTask>,
    pub cooldown: Arc<CooldownTracker>,
    pub alert_channels: Arc<AlertChannels>,
    pub latency: GatewayLatency,
}

pub struct DiscordCommandService {
    services: BotServices,
    search: SearchConfig,
    fetch_limit: usize,
    prefix: String,
}

impl DiscordCommandService {
    pub fn new(services: BotServices, search: SearchConfig, fetch_limit: usize, prefix: &str) -> Self {
        Self { services, search, fetch_limit, prefix: prefix.to_owned() }
    }

    fn interface_error(&self, error: ApplicationError, envelope: &CommandEnvelope) -> InterfaceError {
        if error.is_storage() {
            error!(
                event_name = "command.storage_failed",
                correlation_id = %envelope.request_id,
                verb = %envelope.verb,
                error = %error,
                "command hit a storage failure"
            );
        } else {
            warn!(
                event_name = "command.failed",
                correlation_id = %envelope.request_id,
                verb = %envelope.verb,
                error = %error,
                "command failed"
            );
        }
        error.into_interface(envelope.request_id.clone())
    }

    async fn begin_monitoring(&self, target: &str, keyword: &str) -> Result<MonitorConfigId, ApplicationError> {
        match self.services.store.add_config_if_idle(target, keyword).await? {
            AddOutcome::Added(config_id) => Ok(config_id),
            AddOutcome::AlreadyActive(active) => {
                Err(ApplicationError::AlreadyActive { target: active.target })
            }
        }
    }

    /// Adds the invoking channel to the alert destinations. Runtime channels
    /// are not persisted, so a row resumed after a restart only gains a
    /// destination once someone runs `monitor-posts` again.
    fn register_alert_channel(&self, envelope: &CommandEnvelope) {
        if self.services.alert_channels.register(&envelope.channel_id) {
            info!(
                event_name = "command.monitor.channel_registered",
                correlation_id = %envelope.request_id,
                channel_id = %envelope.channel_id,
                "alert channel registered"
            );
        }
    }

    async fn end_monitoring(&self) -> Result<(), ApplicationError> {
        if self.services.store.deactivate().await? {
            Ok(())
        } else {
            Err(ApplicationError::NotActive)
        }
    }
}

fn wait_seconds(wait: Duration) -> u64 {
    let seconds = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds.max(1)
    }
}

#[async_trait]
impl BotCommandService for DiscordCommandService {
    async fn ping(&self, _envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError> {
        Ok(MessageTemplate::text(format!("🏓 Pong! Latency: {}ms", self.services.latency.millis())))
    }

    async fn profile(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        let profile = self
            .services
            .source
            .fetch_profile(target)
            .await
            .map_err(|error| self.interface_error(error.into(), envelope))?;
        Ok(embeds::profile_message(&profile, &envelope.author_name))
    }

    async fn recent_posts(
        &self,
        target: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        let posts = self
            .services
            .source
            .fetch_posts(target, self.search.recent_posts)
            .await
            .map_err(|error| self.interface_error(error.into(), envelope))?;
        Ok(embeds::recent_posts_message(target, &posts, &envelope.author_name))
    }

    async fn filter_posts(
        &self,
        request: SearchRequest,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        if let Some(wait) = self.services.cooldown.retry_after(&envelope.author_id) {
            info!(
                event_name = "command.search.cooldown",
                correlation_id = %envelope.request_id,
                author_id = %envelope.author_id,
                wait_secs = wait.as_secs(),
                "search rejected by cooldown"
            );
            return Ok(MessageTemplate::text(format!(
                "Please wait {} seconds before using this command again.",
                wait_seconds(wait)
            )));
        }

        let mut notices = Vec::new();
        let mut days = request.days.unwrap_or(self.search.default_days);
        if days > self.search.max_days {
            notices.push(format!(
                "Maximum lookback period is {max} days. Using {max} days instead.",
                max = self.search.max_days
            ));
            days = self.search.max_days;
        }

        let posts = self
            .services
            .source
            .fetch_posts(&request.target, self.fetch_limit)
            .await
            .map_err(|error| self.interface_error(error.into(), envelope))?;
        self.services.cooldown.record_request(&envelope.author_id);

        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let outcome = filter_posts(posts, since, request.keywords.as_deref(), Some(self.search.max_results));
        info!(
            event_name = "command.search.completed",
            correlation_id = %envelope.request_id,
            username = %request.target,
            days,
            matched = outcome.matched,
            truncated = outcome.truncated,
            "search completed"
        );

        if outcome.is_empty() {
            notices.push(format!("No posts found for {} matching the criteria.", request.target));
            return Ok(MessageTemplate::text(notices.join("\n")));
        }
        if outcome.truncated {
            notices.push(format!(
                "Found {} posts. Showing the {} most recent matching posts.",
                outcome.matched, self.search.max_results
            ));
        }

        let summary = SearchSummary { days, keywords: request.keywords, notices };
        Ok(embeds::search_results_message(&outcome.posts, &summary))
    }

    async fn start_monitoring(
        &self,
        target: &str,
        keyword: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        match self.begin_monitoring(target, keyword).await {
            Ok(config_id) => {
                self.register_alert_channel(envelope);
                let spawned = self.services.monitor.ensure_started();
                info!(
                    event_name = "command.monitor.started",
                    correlation_id = %envelope.request_id,
                    config_id = config_id.0,
                    username = %target,
                    keyword,
                    loop_spawned = spawned,
                    "monitoring started"
                );
                Ok(embeds::monitoring_started_message(target, keyword))
            }
            Err(ApplicationError::AlreadyActive { .. }) => {
                self.register_alert_channel(envelope);
                self.services.monitor.ensure_started();
                Ok(MessageTemplate::text(format!(
                    "Monitoring is already active. Use {}stop-monitoring to stop first.",
                    self.prefix
                )))
            }
            Err(error) => Err(self.interface_error(error, envelope)),
        }
    }

    async fn stop_monitoring(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, InterfaceError> {
        match self.end_monitoring().await {
            Ok(()) => {
                info!(
                    event_name = "command.monitor.stopped",
                    correlation_id = %envelope.request_id,
                    "monitoring stopped"
                );
                Ok(MessageTemplate::text("Monitoring stopped successfully."))
            }
            Err(ApplicationError::NotActive) => Ok(MessageTemplate::text("No active monitoring to stop.")),
            Err(error) => Err(self.interface_error(error, envelope)),
        }
    }

    async fn monitoring_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, InterfaceError> {
        let active = self
            .services
            .store
            .active_config()
            .await
            .map_err(|error| self.interface_error(error.into(), envelope))?;
        Ok(match active {
            Some(config) => embeds::monitoring_status_message(&config),
            None => MessageTemplate::text("No active monitoring configuration."),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::sync::Mutex;

    use truthwatch_core::config::AppConfig;
    use truthwatch_core::domain::post::{Post, PostId};
    use truthwatch_core::domain::profile::Profile;
    use truthwatch_core::monitor::{MonitorPoller, MonitorStore, MonitorTask, PollerSettings, StoreError};
    use truthwatch_core::source::{PostSource, SourceError};
    use truthwatch_core::{CooldownPolicy, CooldownTracker, InterfaceError};
    use truthwatch_db::InMemoryMonitorRepository;
    use truthwatch_discord::commands::{BotCommandService, CommandEnvelope, SearchRequest};
    use truthwatch_discord::gateway::GatewayLatency;

    use super::{wait_seconds, BotServices, DiscordCommandService};
    use crate::alerts::test_support::RecordingMessenger;
    use crate::alerts::{AlertChannels, ChannelAlertSink};

    struct StubSource {
        posts: Vec<Post>,
        fetches: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl PostSource for StubSource {
        async fn fetch_profile(&self, target: &str) -> Result<Profile, SourceError> {
            match target {
                "someone" => Ok(author()),
                "down" => Err(SourceError::Transport("timed out".to_owned())),
                other => Err(SourceError::NotFound(other.to_owned())),
            }
        }

        async fn fetch_posts(&self, target: &str, limit: usize) -> Result<Vec<Post>, SourceError> {
            self.fetches.lock().await.push((target.to_owned(), limit));
            if target == "ghost" {
                return Err(SourceError::NotFound(target.to_owned()));
            }
            Ok(self.posts.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl MonitorStore for BrokenStore {
        async fn add_config(
            &self,
            _target: &str,
            _keyword: &str,
        ) -> Result<truthwatch_core::MonitorConfigId, StoreError> {
            Err(StoreError::Storage("disk I/O error".to_owned()))
        }

        async fn active_config(
            &self,
        ) -> Result<Option<truthwatch_core::MonitoringConfig>, StoreError> {
            Err(StoreError::Storage("disk I/O error".to_owned()))
        }

        async fn update_last_seen(
            &self,
            _post_id: &PostId,
            _checked_at: chrono::DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Storage("disk I/O error".to_owned()))
        }

        async fn update_last_seen_for(
            &self,
            _id: truthwatch_core::MonitorConfigId,
            _post_id: &PostId,
            _checked_at: chrono::DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Storage("disk I/O error".to_owned()))
        }

        async fn deactivate(&self) -> Result<bool, StoreError> {
            Err(StoreError::Storage("disk I/O error".to_owned()))
        }
    }

    fn author() -> Profile {
        Profile {
            username: "someone".to_owned(),
            display_name: "Some One".to_owned(),
            bio: None,
            followers_count: 1,
            following_count: 1,
            posts_count: 1,
            created_at: Utc::now(),
            verified: false,
        }
    }

    fn post(id: usize, content: &str, age_days: i64) -> Post {
        Post {
            id: PostId(id.to_string()),
            author: author(),
            content: content.to_owned(),
            created_at: Utc::now() - ChronoDuration::days(age_days),
            likes_count: 0,
            replies_count: 0,
            reposts_count: 0,
            is_repost: false,
        }
    }

    fn envelope(channel_id: &str) -> CommandEnvelope {
        CommandEnvelope {
            verb: "filter-posts".to_owned(),
            args: Vec::new(),
            channel_id: channel_id.to_owned(),
            guild_id: None,
            author_id: "u-1".to_owned(),
            author_name: "alice".to_owned(),
            request_id: "m-1".to_owned(),
        }
    }

    struct Harness {
        service: DiscordCommandService,
        source: Arc<StubSource>,
        store: Arc<dyn MonitorStore>,
        monitor: Arc<MonitorTask>,
        channels: Arc<AlertChannels>,
    }

    fn harness_with(posts: Vec<Post>, store: Arc<dyn MonitorStore>, policy: CooldownPolicy) -> Harness {
        let config = AppConfig::default();
        let source = Arc::new(StubSource { posts, fetches: Mutex::new(Vec::new()) });
        let channels = Arc::new(AlertChannels::default());
        let sink = Arc::new(ChannelAlertSink::new(
            Arc::clone(&channels),
            Arc::new(RecordingMessenger::default()),
        ));
        let monitor = Arc::new(MonitorTask::new(MonitorPoller::new(
            Arc::clone(&store),
            source.clone(),
            sink,
            PollerSettings { interval: Duration::from_secs(3600), fetch_limit: 20 },
        )));
        let latency = GatewayLatency::default();
        latency.record(Duration::from_millis(42));
        let service = DiscordCommandService::new(
            BotServices {
                source: source.clone(),
                store: Arc::clone(&store),
                monitor: Arc::clone(&monitor),
                cooldown: Arc::new(CooldownTracker::new(policy)),
                alert_channels: Arc::clone(&channels),
                latency,
            },
            config.search.clone(),
            config.scraper.max_posts,
            "!",
        );
        Harness { service, source, store, monitor, channels }
    }

    fn harness(posts: Vec<Post>) -> Harness {
        harness_with(posts, Arc::new(InMemoryMonitorRepository::new()), CooldownPolicy::default())
    }

    fn search(target: &str, keywords: Option<&str>, days: Option<u32>) -> SearchRequest {
        SearchRequest { target: target.to_owned(), keywords: keywords.map(str::to_owned), days }
    }

    #[test]
    fn wait_seconds_rounds_up() {
        assert_eq!(wait_seconds(Duration::from_millis(29_100)), 30);
        assert_eq!(wait_seconds(Duration::from_secs(12)), 12);
        assert_eq!(wait_seconds(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn ping_reports_gateway_latency() {
        let reply = harness(Vec::new()).service.ping(&envelope("c-1")).await.expect("ping");
        assert_eq!(reply.content.as_deref(), Some("🏓 Pong! Latency: 42ms"));
    }

    #[tokio::test]
    async fn profile_errors_map_to_interface_errors() {
        let harness = harness(Vec::new());
        let reply = harness.service.profile("someone", &envelope("c-1")).await.expect("profile");
        assert_eq!(reply.embeds.len(), 1);

        assert!(matches!(
            harness.service.profile("nobody", &envelope("c-1")).await,
            Err(InterfaceError::NotFound { ref correlation_id, .. }) if correlation_id == "m-1"
        ));
        assert!(matches!(
            harness.service.profile("down", &envelope("c-1")).await,
            Err(InterfaceError::ServiceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn recent_posts_use_configured_count() {
        let harness = harness((0..8).map(|index| post(100 - index, "x", 0)).collect());
        let reply = harness.service.recent_posts("someone", &envelope("c-1")).await.expect("posts");

        assert_eq!(reply.embeds.len(), 5);
        assert_eq!(harness.source.fetches.lock().await[0], ("someone".to_owned(), 5));
    }

    #[tokio::test]
    async fn search_caps_results_and_reports_total() {
        let harness = harness((0..10).map(|index| post(200 - index, "tariffs again", 1)).collect());
        let reply = harness
            .service
            .filter_posts(search("someone", Some("TARIFFS"), None), &envelope("c-1"))
            .await
            .expect("search");

        assert_eq!(reply.embeds.len(), 5);
        let content = reply.content.expect("content");
        assert!(content.contains("Found 10 posts. Showing the 5 most recent matching posts."));
        assert!(content.ends_with("Found 5 posts matching your criteria."));
    }

    #[tokio::test]
    async fn search_clamps_lookback_and_reports_empty_results() {
        let harness = harness(vec![post(1, "old news", 40), post(2, "other", 2)]);
        let reply = harness
            .service
            .filter_posts(search("someone", Some("news"), Some(45)), &envelope("c-1"))
            .await
            .expect("search");

        assert_eq!(
            reply.content.as_deref(),
            Some(
                "Maximum lookback period is 30 days. Using 30 days instead.\n\
                 No posts found for someone matching the criteria."
            )
        );
        assert!(reply.embeds.is_empty());
    }

    #[tokio::test]
    async fn search_cooldown_blocks_after_hourly_cap() {
        let policy = CooldownPolicy { cooldown: Duration::from_secs(30), max_requests_per_hour: 2 };
        let harness = harness_with(
            vec![post(1, "x", 0)],
            Arc::new(InMemoryMonitorRepository::new()),
            policy,
        );

        for _ in 0..2 {
            let reply = harness.service.filter_posts(search("someone", None, None), &envelope("c-1")).await;
            assert!(reply.expect("allowed").content.is_some_and(|text| !text.starts_with("Please wait")));
        }
        let blocked = harness
            .service
            .filter_posts(search("someone", None, None), &envelope("c-1"))
            .await
            .expect("blocked reply");
        assert_eq!(
            blocked.content.as_deref(),
            Some("Please wait 30 seconds before using this command again.")
        );
        assert_eq!(harness.source.fetches.lock().await.len(), 2, "blocked search does not fetch");
    }

    #[tokio::test]
    async fn failed_search_does_not_count_against_cooldown() {
        let policy = CooldownPolicy { cooldown: Duration::from_secs(30), max_requests_per_hour: 1 };
        let harness = harness_with(Vec::new(), Arc::new(InMemoryMonitorRepository::new()), policy);

        assert!(harness.service.filter_posts(search("ghost", None, None), &envelope("c-1")).await.is_err());
        let reply = harness
            .service
            .filter_posts(search("someone", None, None), &envelope("c-1"))
            .await
            .expect("second search");
        assert_eq!(reply.content.as_deref(), Some("No posts found for someone matching the criteria."));
    }

    #[tokio::test]
    async fn monitoring_lifecycle() {
        let harness = harness(Vec::new());
        let envelope = envelope("c-7");

        let status = harness.service.monitoring_status(&envelope).await.expect("status");
        assert_eq!(status.content.as_deref(), Some("No active monitoring configuration."));

        let started = harness.service.start_monitoring("someone", "border", &envelope).await.expect("start");
        assert_eq!(
            started.content.as_deref(),
            Some(
                "Started monitoring posts from @someone for keyword: border\n\
                 I'll notify you when new matching posts are found!"
            )
        );
        assert!(harness.monitor.is_started());
        assert_eq!(harness.channels.channels(), vec!["c-7"]);

        let again = harness.service.start_monitoring("other", "x", &envelope).await.expect("again");
        assert_eq!(
            again.content.as_deref(),
            Some("Monitoring is already active. Use !stop-monitoring to stop first.")
        );
        let active = harness.store.active_config().await.expect("read").expect("active");
        assert_eq!(active.target, "someone");

        let status = harness.service.monitoring_status(&envelope).await.expect("status");
        assert_eq!(status.embeds[0].title.as_deref(), Some("Monitoring Status"));

        let stopped = harness.service.stop_monitoring(&envelope).await.expect("stop");
        assert_eq!(stopped.content.as_deref(), Some("Monitoring stopped successfully."));
        let again = harness.service.stop_monitoring(&envelope).await.expect("stop again");
        assert_eq!(again.content.as_deref(), Some("No active monitoring to stop."));
        assert!(harness.monitor.is_started(), "stop leaves the loop running");
    }

    #[tokio::test]
    async fn already_active_row_from_previous_run_gains_the_invoking_channel() {
        let harness = harness(vec![post(7, "the border", 0)]);
        harness.store.add_config("someone", "border").await.expect("row left by previous run");

        let reply = harness
            .service
            .start_monitoring("someone", "border", &envelope("c-9"))
            .await
            .expect("start");
        assert_eq!(
            reply.content.as_deref(),
            Some("Monitoring is already active. Use !stop-monitoring to stop first.")
        );
        assert_eq!(harness.channels.channels(), vec!["c-9"]);
        assert!(harness.monitor.is_started());

        // The cursor only moves once the alert reached a channel.
        let mut cursor = None;
        for _ in 0..100 {
            let active = harness.store.active_config().await.expect("read").expect("active");
            cursor = active.last_seen_post_id;
            if cursor.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cursor, Some(PostId("7".to_owned())));
    }

    #[tokio::test]
    async fn storage_failures_become_internal_errors() {
        let harness = harness_with(Vec::new(), Arc::new(BrokenStore), CooldownPolicy::default());
        let envelope = envelope("c-1");

        assert!(matches!(
            harness.service.start_monitoring("someone", "k", &envelope).await,
            Err(InterfaceError::Internal { .. })
        ));
        assert!(matches!(
            harness.service.stop_monitoring(&envelope).await,
            Err(InterfaceError::Internal { .. })
        ));
        assert!(matches!(
            harness.service.monitoring_status(&envelope).await,
            Err(InterfaceError::Internal { .. })
        ));
        assert!(!harness.monitor.is_started());
    }
}
