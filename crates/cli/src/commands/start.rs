use crate::commands::{runtime, CommandResult};
use truthwatch_core::config::{AppConfig, LoadOptions};
use truthwatch_db::{connect_from_config, migrations};

/// Preflight for `truthwatch-bot`: the config validates and the database is
/// reachable. Pending migrations are reported, not applied; the bot applies
/// them itself during bootstrap.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<i64, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(applied) => {
            let known = migrations::MIGRATOR.iter().count() as i64;
            let pending = (known - applied).max(0);
            CommandResult::success(
                "start",
                format!(
                    "preflight passed: prefix `{}`, polling every {}s, {pending} pending migration(s)",
                    config.discord.command_prefix, config.monitor.poll_interval_secs
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
