use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result label published when a pipeline state carries neither a stage nor a result.
pub const UNKNOWN_RESULT: &str = "Unknown";

/// Repository entry of the workspace listing. Only the slug is used.
#[derive(Debug, Deserialize)]
pub struct RawRepository {
    pub slug: String,
}

/// Entry of `/user/permission/workspaces`.
#[derive(Debug, Deserialize)]
pub struct RawWorkspacePermission {
    pub permission: String,
    pub workspace: RawWorkspace,
}

#[derive(Debug, Deserialize)]
pub struct RawWorkspace {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// A workspace the configured credentials can access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceAccess {
    pub slug: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub permission: String,
}

impl From<RawWorkspacePermission> for WorkspaceAccess {
    fn from(raw: RawWorkspacePermission) -> Self {
        Self {
            slug: raw.workspace.slug,
            name: raw.workspace.name,
            uuid: raw.workspace.uuid,
            permission: raw.permission,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawPipelineState {
    name: String,
    #[serde(default)]
    stage: Option<Named>,
    #[serde(default)]
    result: Option<Named>,
}

#[derive(Debug, Deserialize)]
pub struct RawCreator {
    display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
pub struct RawCommitLinks {
    html: Href,
}

#[derive(Debug, Deserialize)]
pub struct RawCommit {
    links: RawCommitLinks,
}

#[derive(Debug, Deserialize)]
pub struct RawSelector {
    pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct RawTarget {
    commit: RawCommit,
    selector: RawSelector,
}

/// Pipeline object as returned by `/repositories/{workspace}/{repo}/pipelines`.
#[derive(Debug, Deserialize)]
pub struct RawPipeline {
    build_number: u64,
    state: RawPipelineState,
    duration_in_seconds: f64,
    creator: RawCreator,
    target: RawTarget,
    #[serde(default)]
    created_on: Option<DateTime<Utc>>,
}

/// What a pipeline state reports beyond its name.
///
/// A running pipeline reports the stage it is in, a finished one reports its
/// result. When both are present the stage wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum PipelineOutcome {
    Stage(String),
    Result(String),
    Unknown,
}

impl PipelineOutcome {
    pub fn label(&self) -> &str {
        match self {
            Self::Stage(name) | Self::Result(name) => name,
            Self::Unknown => UNKNOWN_RESULT,
        }
    }
}

impl From<RawPipelineState> for PipelineOutcome {
    fn from(state: RawPipelineState) -> Self {
        match (state.stage, state.result) {
            (Some(stage), _) => Self::Stage(stage.name),
            (None, Some(result)) => Self::Result(result.name),
            (None, None) => Self::Unknown,
        }
    }
}

/// The most recent pipeline run of a repository, flattened to the fields we publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPipeline")]
pub struct PipelineExecution {
    pub build_number: u64,
    pub state_name: String,
    pub outcome: PipelineOutcome,
    pub duration_seconds: f64,
    pub creator_name: String,
    pub commit_url: String,
    pub target_branch: String,
    pub created_on: Option<DateTime<Utc>>,
}

impl PipelineExecution {
    /// Stage name, result name or `"Unknown"`, in that order of preference.
    pub fn state_result(&self) -> &str {
        self.outcome.label()
    }
}

impl From<RawPipeline> for PipelineExecution {
    fn from(raw: RawPipeline) -> Self {
        let state_name = raw.state.name.clone();

        Self {
            build_number: raw.build_number,
            state_name,
            outcome: raw.state.into(),
            duration_seconds: raw.duration_in_seconds,
            creator_name: raw.creator.display_name,
            commit_url: raw.target.commit.links.html.href,
            target_branch: raw.target.selector.pattern,
            created_on: raw.created_on,
        }
    }
}
