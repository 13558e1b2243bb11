//! Post-restore health checks.
//!
//! Checks are looked up by identifier in a [`HealthCheckRegistry`]; the
//! configuration lists which ones to run and in what order.

pub(crate) mod checks;

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::config::{HealthCheckEntry, RestoreConfig};
use crate::database::Database;

/// What a check sees of the restored system.
pub struct CheckContext<'a> {
    pub config: &'a RestoreConfig,
    /// `None` when no database connection is available.
    pub database: Option<&'a dyn Database>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    pub passed: bool,
    pub message: String,
}

impl HealthCheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn run(&self, ctx: &CheckContext<'_>) -> HealthCheckOutcome;
}

pub type CheckFactory = fn(&HealthCheckEntry, &RestoreConfig) -> Box<dyn HealthCheck>;

pub struct HealthCheckRegistry {
    factories: BTreeMap<String, CheckFactory>,
}

impl HealthCheckRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in check.
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::empty();
        checks::register_builtin_checks(&mut registry);
        registry
    }

    pub fn register(&mut self, id: &str, factory: CheckFactory) {
        self.factories.insert(normalize_identifier(id), factory);
    }

    /// Builds the check named by `entry`, if one is registered.
    pub fn resolve(
        &self,
        entry: &HealthCheckEntry,
        config: &RestoreConfig,
    ) -> Option<Box<dyn HealthCheck>> {
        self.factories
            .get(&normalize_identifier(entry.id()))
            .map(|factory| factory(entry, config))
    }
}

/// Reduces an identifier to lowercase alphanumerics, so `database-has-tables`,
/// `DatabaseHasTables` and `App\HealthChecks\DatabaseHasTables` all match.
pub fn normalize_identifier(id: &str) -> String {
    let last_segment = id.rsplit(['\\', '/', ':']).next().unwrap_or(id);
    last_segment
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub outcome: HealthCheckOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub results: Vec<CheckResult>,
    /// Configured identifiers with no registered check.
    pub unknown: Vec<String>,
}

impl HealthReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs the configured checks in order.
pub async fn run_health_checks(
    registry: &HealthCheckRegistry,
    entries: &[HealthCheckEntry],
    ctx: &CheckContext<'_>,
) -> HealthReport {
    info!("🏥 Running health checks...");
    let mut report = HealthReport::default();

    for entry in entries {
        let Some(check) = registry.resolve(entry, ctx.config) else {
            warn!("⚠️  Unknown health check '{}', skipping", entry.id());
            report.unknown.push(entry.id().to_string());
            continue;
        };

        debug!("Running {}: {}", check.name(), check.description());
        let outcome = check.run(ctx).await;
        if outcome.passed {
            info!("   ✅ {}: {}", check.name(), outcome.message);
        } else {
            error!("   ❌ {}: {}", check.name(), outcome.message);
        }
        report.results.push(CheckResult {
            name: check.name().to_string(),
            outcome,
        });
    }

    info!(
        "🏥 Health checks: {} passed, {} failed, {} total",
        report.passed(),
        report.failed(),
        report.total()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;
    use crate::database::testing::MemoryDatabase;
    use serde_json::json;
    use std::path::Path;

    fn config(checks: serde_json::Value) -> RestoreConfig {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "disks": { "local": { "root": "/backups" } },
            "health_checks": checks
        }))
        .unwrap();
        RestoreConfig::from_raw(raw, Path::new("/")).unwrap()
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("database-has-tables"), "databasehastables");
        assert_eq!(normalize_identifier("DatabaseHasTables"), "databasehastables");
        assert_eq!(
            normalize_identifier("App\\HealthChecks\\DatabaseHasTables"),
            "databasehastables"
        );
    }

    #[tokio::test]
    async fn test_unknown_checks_are_skipped_and_counts_add_up() {
        let config = config(json!(["database-connection", "no-such-check", "database-has-tables"]));
        let db = MemoryDatabase::with_tables(&[]);
        let ctx = CheckContext {
            config: &config,
            database: Some(&db),
        };

        let report =
            run_health_checks(&HealthCheckRegistry::with_builtin_checks(), &config.health_checks, &ctx)
                .await;

        assert_eq!(report.unknown, vec!["no-such-check"]);
        assert_eq!(report.total(), 2);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.passed() + report.failed(), report.total());
        assert!(!report.all_passed());
    }

    #[tokio::test]
    async fn test_custom_checks_can_be_registered() {
        struct AlwaysFails;

        #[async_trait]
        impl HealthCheck for AlwaysFails {
            fn name(&self) -> &str {
                "Always fails"
            }

            fn description(&self) -> &str {
                "fails"
            }

            async fn run(&self, _ctx: &CheckContext<'_>) -> HealthCheckOutcome {
                HealthCheckOutcome::fail("nope")
            }
        }

        let mut registry = HealthCheckRegistry::empty();
        registry.register("always-fails", |_, _| -> Box<dyn HealthCheck> {
            Box::new(AlwaysFails)
        });

        let config = config(json!(["AlwaysFails"]));
        let ctx = CheckContext {
            config: &config,
            database: None,
        };
        let report = run_health_checks(&registry, &config.health_checks, &ctx).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.results[0].outcome.message, "nope");
    }
}
