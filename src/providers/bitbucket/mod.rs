mod client;
mod provider;
pub mod types;

pub use client::DEFAULT_BASE_URL;
pub use provider::BitbucketProvider;
pub use types::PipelineExecution;
