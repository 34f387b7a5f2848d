//! Deployment provider plugin

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub project_name: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DeployProgress {
    Packaging,
    Uploading { percent: u8 },
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub url: String,
    pub deployment_id: String,
}

/// Ships a packaged project to a hosting provider
#[async_trait]
pub trait DeploymentProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn deploy(
        &self,
        archive: &[u8],
        config: &DeployConfig,
        progress: &(dyn Fn(DeployProgress) + Send + Sync),
    ) -> Result<DeploymentResult>;
}
