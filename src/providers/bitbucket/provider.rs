use log::{debug, info, warn};
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::Result;

use super::client::BitbucketClient;
use super::types::{PipelineExecution, WorkspaceAccess};

/// Bitbucket Pipelines provider for a single workspace.
///
/// Wraps the API client with the workspace it was configured for and logs every
/// failure it hands back, so callers only decide what to do with the outcome.
pub struct BitbucketProvider {
    client: BitbucketClient,
    workspace: String,
}

impl BitbucketProvider {
    /// Creates a new provider for `workspace`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root (e.g., <https://api.bitbucket.org/2.0>)
    /// * `workspace` - Workspace slug or UUID
    /// * `credentials` - Username and app password for Basic auth
    /// * `timeout` - Upper bound for every outbound request
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        workspace: String,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let client = BitbucketClient::new(base_url, credentials, timeout)?;

        Ok(Self { client, workspace })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Lists the workspace's repository slugs in API order.
    ///
    /// Pagination failures are logged and truncate the list instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listing URL cannot be built.
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        info!("Listing repositories of workspace: {}", self.workspace);

        let repositories = self.client.fetch_repository_slugs(&self.workspace).await?;

        info!(
            "Found {} repositories in workspace {}",
            repositories.len(),
            self.workspace
        );
        debug!("Repositories: {repositories:?}");

        Ok(repositories)
    }

    /// Latest pipeline run of `repository`.
    ///
    /// `Ok(None)` when the repository has no pipelines; `Err` when the request or the
    /// response was bad. Both are logged here.
    ///
    /// # Errors
    ///
    /// Returns an error for non-success statuses, transport failures, and bodies that
    /// are not JSON or lack expected pipeline fields.
    pub async fn latest_pipeline(&self, repository: &str) -> Result<Option<PipelineExecution>> {
        match self
            .client
            .fetch_latest_pipeline(&self.workspace, repository)
            .await
        {
            Ok(Some(execution)) => {
                debug!(
                    "Latest pipeline of {repository}: #{} {} ({})",
                    execution.build_number,
                    execution.state_name,
                    execution.state_result()
                );
                Ok(Some(execution))
            }
            Ok(None) => {
                info!("Repository {repository} has no pipelines");
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to fetch pipelines for {repository}: {e}");
                Err(e)
            }
        }
    }

    /// Workspaces the configured credentials can see.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listing URL cannot be built.
    pub async fn list_workspaces(&self) -> Result<Vec<WorkspaceAccess>> {
        self.client.fetch_workspaces().await
    }
}
