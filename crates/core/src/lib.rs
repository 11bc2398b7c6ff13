pub mod config;
pub mod cooldown;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod monitor;
pub mod source;

pub use cooldown::{CooldownPolicy, CooldownTracker};
pub use domain::monitor::{MonitorConfigId, MonitoringConfig};
pub use domain::post::{Post, PostId};
pub use domain::profile::Profile;
pub use errors::{ApplicationError, InterfaceError};
pub use filter::{filter_posts, parse_keywords, FilterOutcome};
pub use monitor::{
    AddOutcome, AlertError, AlertSink, MonitorPoller, MonitorStore, MonitorTask, PollError,
    PollOutcome, PollerSettings, PostAlert, StoreError,
};
pub use source::{PostSource, SourceError};
