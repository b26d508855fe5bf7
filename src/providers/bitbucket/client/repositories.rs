use super::core::BitbucketClient;
use crate::error::Result;
use crate::providers::bitbucket::types::{RawRepository, RawWorkspacePermission, WorkspaceAccess};

impl BitbucketClient {
    /// Slugs of every repository in `workspace`, in listing order.
    ///
    /// Duplicates returned by the API are kept.
    pub async fn fetch_repository_slugs(&self, workspace: &str) -> Result<Vec<String>> {
        let start = self.endpoint(&["repositories", workspace])?;

        let repositories: Vec<RawRepository> = self.fetch_all_pages(start).await;

        Ok(repositories.into_iter().map(|repo| repo.slug).collect())
    }

    /// Workspaces the authenticated user has a permission on.
    pub async fn fetch_workspaces(&self) -> Result<Vec<WorkspaceAccess>> {
        let start = self.endpoint(&["user", "permission", "workspaces"])?;

        let permissions: Vec<RawWorkspacePermission> = self.fetch_all_pages(start).await;

        Ok(permissions.into_iter().map(WorkspaceAccess::from).collect())
    }
}
