use secrecy::ExposeSecret;
use serde::Serialize;
use truthwatch_core::config::{AppConfig, LoadOptions};
use truthwatch_db::{connect_from_config, migrations};

use crate::commands::runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_discord_token(&config));
            checks.push(check_scraper_token(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in [
                "discord_token_readiness",
                "scraper_token_readiness",
                "database_connectivity",
                "migration_status",
            ] {
                checks.push(skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_discord_token(config: &AppConfig) -> DoctorCheck {
    let token = config.discord.bot_token.expose_secret();
    // Bot tokens are three dot-separated segments.
    let segments = token.split('.').filter(|segment| !segment.is_empty()).count();
    if segments == 3 {
        DoctorCheck {
            name: "discord_token_readiness",
            status: CheckStatus::Pass,
            details: "bot token has the expected shape".to_string(),
        }
    } else {
        DoctorCheck {
            name: "discord_token_readiness",
            status: CheckStatus::Fail,
            details: format!("bot token should have 3 dot-separated segments, found {segments}"),
        }
    }
}

fn check_scraper_token(config: &AppConfig) -> DoctorCheck {
    if config.scraper.api_token.expose_secret().starts_with("apify_api_") {
        DoctorCheck {
            name: "scraper_token_readiness",
            status: CheckStatus::Pass,
            details: format!("Apify token present for actor `{}`", config.scraper.actor_id),
        }
    } else {
        DoctorCheck {
            name: "scraper_token_readiness",
            status: CheckStatus::Fail,
            details: "expected an Apify API token with the `apify_api_` prefix".to_string(),
        }
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("migration_status", "skipped because the database was not reached"),
            ];
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok::<_, String>(applied)
    });

    let applied = match result {
        Ok(applied) => applied,
        Err(error) => {
            return vec![
                DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error },
                skipped("migration_status", "skipped because the database was not reached"),
            ];
        }
    };

    let connectivity = DoctorCheck {
        name: "database_connectivity",
        status: CheckStatus::Pass,
        details: format!("connected using `{}`", config.database.url),
    };
    let known = migrations::MIGRATOR.iter().count() as i64;
    let migration_status = match applied {
        Ok(applied) if applied >= known => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Pass,
            details: format!("{applied}/{known} migrations applied"),
        },
        Ok(applied) => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Fail,
            details: format!("{applied}/{known} migrations applied; run `truthwatch migrate`"),
        },
        Err(error) => DoctorCheck {
            name: "migration_status",
            status: CheckStatus::Fail,
            details: format!("could not read migration history: {error}"),
        },
    };

    vec![connectivity, migration_status]
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
