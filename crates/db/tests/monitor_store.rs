use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use truthwatch_core::domain::post::{Post, PostId};
use truthwatch_core::domain::profile::Profile;
use truthwatch_core::monitor::{
    AddOutcome, AlertError, AlertSink, MonitorPoller, MonitorStore, PollOutcome, PollerSettings,
    PostAlert,
};
use truthwatch_core::source::{PostSource, SourceError};
use truthwatch_db::migrations::run_pending;
use truthwatch_db::{connect_with_settings, InMemoryMonitorRepository, SqlMonitorRepository};

async fn sql_store() -> Arc<dyn MonitorStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    run_pending(&pool).await.expect("migrations");
    Arc::new(SqlMonitorRepository::new(pool))
}

fn memory_store() -> Arc<dyn MonitorStore> {
    Arc::new(InMemoryMonitorRepository::new())
}

async fn stores() -> Vec<(&'static str, Arc<dyn MonitorStore>)> {
    vec![("sql", sql_store().await), ("memory", memory_store())]
}

#[tokio::test]
async fn add_config_sequence_leaves_only_latest_active() {
    for (name, store) in stores().await {
        let first = store.add_config("a", "x").await.expect("add a");
        let second = store.add_config("b", "y").await.expect("add b");
        let third = store.add_config("c", "z").await.expect("add c");

        assert!(first < second && second < third, "{name}: ids must be monotonic");
        let active = store.active_config().await.expect("read").expect("active");
        assert_eq!(active.id, third, "{name}");
        assert_eq!((active.target.as_str(), active.keyword.as_str()), ("c", "z"), "{name}");
        assert!(active.active, "{name}");
        assert_eq!(active.last_seen_post_id, None, "{name}: new rows start without cursor");
        assert_eq!(active.last_checked_at, None, "{name}");
    }
}

#[tokio::test]
async fn add_if_idle_keeps_the_existing_row() {
    for (name, store) in stores().await {
        let first = match store.add_config_if_idle("a", "x").await.expect("add a") {
            AddOutcome::Added(id) => id,
            other => panic!("{name}: expected insert, got {other:?}"),
        };

        match store.add_config_if_idle("b", "y").await.expect("add b") {
            AddOutcome::AlreadyActive(active) => {
                assert_eq!(active.id, first, "{name}");
                assert_eq!(active.target, "a", "{name}");
            }
            other => panic!("{name}: expected the active row, got {other:?}"),
        }
        let active = store.active_config().await.expect("read").expect("active");
        assert_eq!((active.id, active.keyword.as_str()), (first, "x"), "{name}");

        store.deactivate().await.expect("deactivate");
        assert!(
            matches!(store.add_config_if_idle("b", "y").await.expect("add b"), AddOutcome::Added(_)),
            "{name}: idle store accepts a new row"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_if_idle_admits_exactly_one() {
    for (name, store) in stores().await {
        let handles = (0..8)
            .map(|index| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.add_config_if_idle(&format!("user-{index}"), "k").await.expect("add")
                })
            })
            .collect::<Vec<_>>();

        let mut added = 0;
        for handle in handles {
            if matches!(handle.await.expect("join"), AddOutcome::Added(_)) {
                added += 1;
            }
        }
        assert_eq!(added, 1, "{name}: only one concurrent start may win");
    }
}

#[tokio::test]
async fn deactivate_then_start_again() {
    for (name, store) in stores().await {
        assert!(!store.deactivate().await.expect("deactivate empty"), "{name}");
        assert!(!store.is_active().await.expect("is_active"), "{name}");

        store.add_config("someone", "tariffs").await.expect("add");
        assert!(store.is_active().await.expect("is_active"), "{name}");

        assert!(store.deactivate().await.expect("deactivate"), "{name}");
        assert!(!store.is_active().await.expect("is_active"), "{name}");
        assert_eq!(store.active_config().await.expect("read"), None, "{name}");

        let restarted = store.add_config("someone", "tariffs").await.expect("restart");
        let active = store.active_config().await.expect("read").expect("active");
        assert_eq!(active.id, restarted, "{name}");
        assert_eq!(active.last_seen_post_id, None, "{name}: restart does not inherit cursor");
    }
}

#[tokio::test]
async fn cursor_updates_require_an_active_row() {
    for (name, store) in stores().await {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("timestamp");
        let post_id = PostId("500".to_owned());

        assert!(!store.update_last_seen(&post_id, at).await.expect("noop"), "{name}");

        let id = store.add_config("someone", "k").await.expect("add");
        assert!(store.update_last_seen(&post_id, at).await.expect("update"), "{name}");
        let active = store.active_config().await.expect("read").expect("active");
        assert_eq!(active.last_seen_post_id, Some(post_id.clone()), "{name}");
        assert_eq!(active.last_checked_at, Some(at), "{name}");

        store.deactivate().await.expect("deactivate");
        let later = PostId("501".to_owned());
        assert!(!store.update_last_seen_for(id, &later, at).await.expect("noop"), "{name}");
    }
}

#[tokio::test]
async fn concurrent_adds_never_leave_two_active_rows() {
    for (name, store) in stores().await {
        let mut handles = Vec::new();
        for index in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add_config(&format!("user{index}"), "k").await.expect("add")
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join"));
        }

        let active = store.active_config().await.expect("read").expect("active");
        assert!(ids.contains(&active.id), "{name}");
        assert_eq!(ids.iter().max(), Some(&active.id), "{name}: last insert wins");
    }
}

struct FixedSource {
    posts: Vec<Post>,
}

#[async_trait]
impl PostSource for FixedSource {
    async fn fetch_profile(&self, target: &str) -> Result<Profile, SourceError> {
        Err(SourceError::NotFound(target.to_owned()))
    }

    async fn fetch_posts(&self, _target: &str, limit: usize) -> Result<Vec<Post>, SourceError> {
        Ok(self.posts.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
struct CollectingSink {
    alerts: Mutex<Vec<PostAlert>>,
}

#[async_trait]
impl AlertSink for CollectingSink {
    async fn emit(&self, alert: &PostAlert) -> Result<(), AlertError> {
        self.alerts.lock().expect("lock").push(alert.clone());
        Ok(())
    }
}

fn author() -> Profile {
    Profile {
        username: "someone".to_owned(),
        display_name: "Some One".to_owned(),
        bio: None,
        followers_count: 0,
        following_count: 0,
        posts_count: 0,
        created_at: Utc::now(),
        verified: false,
    }
}

fn post(id: &str, content: &str) -> Post {
    Post {
        id: PostId(id.to_owned()),
        author: author(),
        content: content.to_owned(),
        created_at: Utc::now(),
        likes_count: 0,
        replies_count: 0,
        reposts_count: 0,
        is_repost: false,
    }
}

#[tokio::test]
async fn poller_advances_sql_cursor_and_skips_seen_post() {
    let store = sql_store().await;
    store.add_config("someone", "Keyword").await.expect("add");
    store.update_last_seen(&PostId("123".to_owned()), Utc::now()).await.expect("seed cursor");

    let source = Arc::new(FixedSource {
        posts: vec![
            post("123", "keyword one"),
            post("124", "KEYWORD two"),
            post("125", "a keyword three"),
            post("126", "unrelated"),
        ],
    });
    let sink = Arc::new(CollectingSink::default());
    let poller = MonitorPoller::new(
        Arc::clone(&store),
        source,
        sink.clone(),
        PollerSettings { interval: Duration::from_secs(300), fetch_limit: 20 },
    );

    let outcome = poller.poll_once().await.expect("poll");
    assert!(matches!(outcome, PollOutcome::Checked { fetched: 4, alerted: 2, cursor_advanced: true, .. }));

    let alerted = sink
        .alerts
        .lock()
        .expect("lock")
        .iter()
        .map(|alert| alert.post.id.0.clone())
        .collect::<Vec<_>>();
    assert_eq!(alerted, vec!["124", "125"]);

    let active = store.active_config().await.expect("read").expect("active");
    assert_eq!(active.last_seen_post_id, Some(PostId("124".to_owned())));
    assert!(active.last_checked_at.is_some());
}
