//! Job catalog: which work bodies a trigger fans out into.
//!
//! A trigger name maps to a plan, an ordered list of work bodies. Names with
//! no explicit plan get the default plan. Plans can be loaded from TOML:
//!
//! ```toml
//! [default]
//! units = 3
//! duration_ms = 5000
//!
//! [[job]]
//! name = "reindex"
//! work = [{ duration_ms = 200 }, { duration_ms = 1500 }]
//! ```

use crate::error::{Error, Result};
use crate::model::WorkItem;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Boxed future returned by a work body.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// The body of a single unit of work. Opaque to the dispatcher.
pub trait WorkBody: Send + Sync + 'static {
    fn run(&self, item: WorkItem) -> WorkFuture;
}

impl<F, Fut> WorkBody for F
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self, item: WorkItem) -> WorkFuture {
        Box::pin(self(item))
    }
}

/// Ordered work bodies dispatched for one trigger.
pub type Plan = Vec<Arc<dyn WorkBody>>;

/// Fixed-duration work: logs, sleeps, logs.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    pub duration: Duration,
}

impl SimulatedWork {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl WorkBody for SimulatedWork {
    fn run(&self, item: WorkItem) -> WorkFuture {
        let duration = self.duration;
        Box::pin(async move {
            info!(trigger = %item.trigger.name, slot = item.slot, "starting job");
            tokio::time::sleep(duration).await;
            info!(trigger = %item.trigger.name, slot = item.slot, "finished job");
            anyhow::Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// TOML
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default: Option<DefaultPlan>,
    #[serde(default)]
    job: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct DefaultPlan {
    units: usize,
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    name: String,
    work: Vec<WorkEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkEntry {
    duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Registry of plans, indexed by trigger name.
pub struct JobCatalog {
    default: Plan,
    jobs: HashMap<String, Plan>,
}

impl JobCatalog {
    /// Catalog where every trigger gets `units` simulated units of `duration`.
    pub fn uniform(units: usize, duration: Duration) -> Result<Self> {
        Ok(Self {
            default: simulated_plan(units, duration)?,
            jobs: HashMap::new(),
        })
    }

    /// Catalog where every trigger gets `default` and nothing else is named.
    pub fn with_default(default: Plan) -> Result<Self> {
        if default.is_empty() {
            return Err(Error::Config("default plan has no work".to_string()));
        }
        Ok(Self {
            default,
            jobs: HashMap::new(),
        })
    }

    /// Load a catalog from a TOML file.
    ///
    /// `fallback` is used when the file has no `[default]` table.
    pub fn load_from_file(path: &Path, fallback: Plan) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read job catalog {}: {e}", path.display()))
        })?;
        Self::from_toml(&content, fallback)
            .map_err(|e| Error::Config(format!("bad job catalog {}: {e}", path.display())))
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml(content: &str, fallback: Plan) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        let mut catalog = match file.default {
            Some(d) => Self::uniform(d.units, Duration::from_millis(d.duration_ms))?,
            None => Self::with_default(fallback)?,
        };

        for job in file.job {
            let plan: Plan = job
                .work
                .iter()
                .map(|w| {
                    Arc::new(SimulatedWork::new(Duration::from_millis(w.duration_ms)))
                        as Arc<dyn WorkBody>
                })
                .collect();
            catalog.insert(job.name, plan)?;
        }

        Ok(catalog)
    }

    /// Set the plan for `name`, replacing any earlier one.
    pub fn insert(&mut self, name: impl Into<String>, plan: Plan) -> Result<()> {
        let name = name.into();
        if plan.is_empty() {
            return Err(Error::Config(format!("job {name} has no work")));
        }
        self.jobs.insert(name, plan);
        Ok(())
    }

    /// Plan for a trigger name. Never empty.
    pub fn plan_for(&self, name: &str) -> &Plan {
        self.jobs.get(name).unwrap_or(&self.default)
    }

    /// Units in the default plan.
    pub fn default_units(&self) -> usize {
        self.default.len()
    }

    /// Explicitly named jobs with their unit counts, sorted by name.
    pub fn named_jobs(&self) -> Vec<(&str, usize)> {
        let mut jobs: Vec<_> = self
            .jobs
            .iter()
            .map(|(name, plan)| (name.as_str(), plan.len()))
            .collect();
        jobs.sort_unstable();
        jobs
    }
}

fn simulated_plan(units: usize, duration: Duration) -> Result<Plan> {
    if units == 0 {
        return Err(Error::Config("a plan needs at least one unit".to_string()));
    }
    Ok((0..units)
        .map(|_| Arc::new(SimulatedWork::new(duration)) as Arc<dyn WorkBody>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> Plan {
        simulated_plan(3, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn unknown_trigger_gets_default_plan() {
        let catalog = JobCatalog::uniform(3, Duration::from_secs(5)).unwrap();
        assert_eq!(catalog.plan_for("alpha").len(), 3);
        assert_eq!(catalog.default_units(), 3);
    }

    #[test]
    fn zero_unit_plans_are_rejected() {
        assert!(JobCatalog::uniform(0, Duration::from_secs(1)).is_err());
        assert!(JobCatalog::with_default(Vec::new()).is_err());

        let mut catalog = JobCatalog::uniform(1, Duration::from_secs(1)).unwrap();
        assert!(catalog.insert("empty", Vec::new()).is_err());
    }

    #[test]
    fn toml_catalog_names_jobs_and_overrides_default() {
        let catalog = JobCatalog::from_toml(
            r#"
            [default]
            units = 2
            duration_ms = 100

            [[job]]
            name = "reindex"
            work = [{ duration_ms = 10 }, { duration_ms = 20 }, { duration_ms = 30 }, { duration_ms = 40 }]
            "#,
            fallback(),
        )
        .unwrap();

        assert_eq!(catalog.default_units(), 2);
        assert_eq!(catalog.plan_for("reindex").len(), 4);
        assert_eq!(catalog.plan_for("other").len(), 2);
        assert_eq!(catalog.named_jobs(), vec![("reindex", 4)]);
    }

    #[test]
    fn toml_without_default_uses_fallback() {
        let catalog = JobCatalog::from_toml(
            r#"
            [[job]]
            name = "quick"
            work = [{ duration_ms = 1 }]
            "#,
            fallback(),
        )
        .unwrap();
        assert_eq!(catalog.default_units(), 3);
        assert_eq!(catalog.plan_for("quick").len(), 1);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let result = JobCatalog::from_toml("[[job]]\nname = 7", fallback());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
