use super::core::BitbucketClient;
use crate::error::{ExporterError, Result};
use crate::providers::bitbucket::types::PipelineExecution;

const SORT_NEWEST_FIRST: &str = "-created_on";

impl BitbucketClient {
    /// Fetch the newest pipeline of `repository`.
    ///
    /// Only the first page is requested. `Ok(None)` means the repository has no pipelines.
    /// Entries after the first are never parsed, so a malformed older pipeline cannot hide
    /// the latest one.
    pub async fn fetch_latest_pipeline(
        &self,
        workspace: &str,
        repository: &str,
    ) -> Result<Option<PipelineExecution>> {
        let mut url = self.endpoint(&["repositories", workspace, repository, "pipelines"])?;
        url.query_pairs_mut().append_pair("sort", SORT_NEWEST_FIRST);

        let page = self.fetch_page::<serde_json::Value>(url).await?;

        page.values
            .into_iter()
            .next()
            .map(|latest| serde_json::from_value(latest).map_err(ExporterError::Schema))
            .transpose()
    }
}
