use log::debug;
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::providers::bitbucket::PipelineExecution;

/// Label values currently exported for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PublishedLabels {
    state: String,
    result: String,
    creator: String,
    commit: String,
    target_branch: String,
}

impl From<&PipelineExecution> for PublishedLabels {
    fn from(execution: &PipelineExecution) -> Self {
        Self {
            state: execution.state_name.clone(),
            result: execution.state_result().to_string(),
            creator: execution.creator_name.clone(),
            commit: execution.commit_url.clone(),
            target_branch: execution.target_branch.clone(),
        }
    }
}

/// Published state of the latest pipeline of every repository.
///
/// Series are only ever written by [`PipelineMetrics::record`]; nothing clears a
/// repository, so a repository whose fetch fails keeps its last values. The prometheus
/// vectors are safe to scrape while they are being updated.
pub struct PipelineMetrics {
    registry: Registry,
    duration: GaugeVec,
    build_number: GaugeVec,
    result: GaugeVec,
    creator: GaugeVec,
    commit: GaugeVec,
    target_branch: GaugeVec,
    published: Mutex<HashMap<String, PublishedLabels>>,
}

fn register_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let duration = register_gauge_vec(
            &registry,
            "pipeline_duration_seconds",
            "Duration of pipeline builds",
            &["repository", "state"],
        )?;
        let build_number = register_gauge_vec(
            &registry,
            "pipeline_last_build_number",
            "Last build number",
            &["repository"],
        )?;
        let result = register_gauge_vec(
            &registry,
            "pipeline_last_result",
            "Last build result as a label",
            &["repository", "result"],
        )?;
        let creator = register_gauge_vec(
            &registry,
            "pipeline_last_creator_info",
            "Last creator Name",
            &["repository", "creator_name"],
        )?;
        let commit = register_gauge_vec(
            &registry,
            "pipeline_last_commit_info",
            "Last commit that triggered the pipeline",
            &["repository", "commit"],
        )?;
        let target_branch = register_gauge_vec(
            &registry,
            "pipeline_last_target_branch_info",
            "Last branch selected to start the pipeline",
            &["repository", "target_branch"],
        )?;

        Ok(Self {
            registry,
            duration,
            build_number,
            result,
            creator,
            commit,
            target_branch,
            published: Mutex::new(HashMap::new()),
        })
    }

    /// Overwrite every series of `repository` with `execution`.
    ///
    /// When a label value changed since the previous record (new state, creator, ...)
    /// the series carrying the old value is dropped after the new one is set.
    pub fn record(&self, repository: &str, execution: &PipelineExecution) {
        let labels = PublishedLabels::from(execution);
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        #[allow(clippy::cast_precision_loss)]
        let build_number = execution.build_number as f64;

        self.duration
            .with_label_values(&[repository, &labels.state])
            .set(execution.duration_seconds);
        self.build_number
            .with_label_values(&[repository])
            .set(build_number);
        self.result
            .with_label_values(&[repository, &labels.result])
            .set(1.0);
        self.creator
            .with_label_values(&[repository, &labels.creator])
            .set(1.0);
        self.commit
            .with_label_values(&[repository, &labels.commit])
            .set(1.0);
        self.target_branch
            .with_label_values(&[repository, &labels.target_branch])
            .set(1.0);

        if let Some(previous) = published.insert(repository.to_string(), labels.clone()) {
            self.drop_replaced(repository, &previous, &labels);
        }
    }

    fn drop_replaced(&self, repository: &str, previous: &PublishedLabels, current: &PublishedLabels) {
        let replaced = [
            (&self.duration, &previous.state, &current.state),
            (&self.result, &previous.result, &current.result),
            (&self.creator, &previous.creator, &current.creator),
            (&self.commit, &previous.commit, &current.commit),
            (&self.target_branch, &previous.target_branch, &current.target_branch),
        ];

        for (gauge, old, new) in replaced {
            if old != new {
                if let Err(e) = gauge.remove_label_values(&[repository, old.as_str()]) {
                    debug!("No series to drop for {repository}/{old}: {e}");
                }
            }
        }
    }

    /// Whether `repository` has ever been recorded.
    pub fn is_published(&self, repository: &str) -> bool {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(repository)
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}
