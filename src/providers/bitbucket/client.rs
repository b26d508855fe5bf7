mod core;
mod pagination;
mod pipelines;
mod repositories;

pub use self::core::{BitbucketClient, DEFAULT_BASE_URL};
