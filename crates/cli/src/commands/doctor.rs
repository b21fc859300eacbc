use demande_core::config::{AppConfig, LoadOptions, SenderKind};
use demande_db::{connect, migrations};
use serde::Serialize;

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
            checks.push(check_notification_delivery(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(
                ["notification_delivery", "database_connectivity", "enrollment_schema"]
                    .into_iter()
                    .map(|name| DoctorCheck {
                        name,
                        status: CheckStatus::Skipped,
                        details: "skipped because configuration did not load".to_string(),
                    }),
            );
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

fn check_notification_delivery(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    let details = match notifications.sender {
        SenderKind::Log => format!(
            "log sender active; emails for {} are written to the log, not delivered",
            notifications.admin_email
        ),
        SenderKind::Http => format!(
            "http relay `{}` (token {})",
            notifications.relay_url.as_deref().unwrap_or("<unset>"),
            if notifications.relay_token.is_some() { "set" } else { "unset" }
        ),
    };
    DoctorCheck { name: "notification_delivery", status: CheckStatus::Pass, details }
}

/// Connects without migrating, then reports which enrollment tables are missing.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let missing = migrations::missing_tables(&pool)
            .await
            .map_err(|error| format!("failed to inspect schema: {error}"));
        pool.close().await;
        missing
    });

    match result {
        Ok(missing) => {
            let connectivity = DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            };
            let schema = if missing.is_empty() {
                DoctorCheck {
                    name: "enrollment_schema",
                    status: CheckStatus::Pass,
                    details: "enrollment tables present".to_string(),
                }
            } else {
                DoctorCheck {
                    name: "enrollment_schema",
                    status: CheckStatus::Fail,
                    details: format!(
                        "missing tables: {} (run `demande migrate`)",
                        missing.join(", ")
                    ),
                }
            };
            vec![connectivity, schema]
        }
        Err(error) => vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: error,
            },
            DoctorCheck {
                name: "enrollment_schema",
                status: CheckStatus::Skipped,
                details: "skipped because the database is unreachable".to_string(),
            },
        ],
    }
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
