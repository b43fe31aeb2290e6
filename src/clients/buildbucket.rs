use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    Scheduled,
    Started,
    Success,
    Failure,
    InfraFailure,
    Canceled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    /// Nested steps are named `parent|child`.
    pub name: String,
    pub status: BuildStatus,
}

impl Step {
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('|').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Build {
    pub id: i64,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Revisions that landed between this build and the previous one.
    #[serde(default)]
    pub blamelist: Vec<String>,
}

/// Where a build URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRef {
    Id(i64),
    Number {
        project: String,
        bucket: String,
        builder: String,
        number: i64,
    },
}

/// Parse a milo build URL.
///
/// Supports `https://<host>/b/<id>` and
/// `https://<host>/p/<project>/builders/<bucket>/<builder>/<number>`.
pub fn parse_build_url(url: &str) -> Result<BuildRef, ClientError> {
    let invalid = || ClientError::InvalidResponse(format!("unrecognized build URL {url:?}"));
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split_once('/')
        .map(|(_, path)| path)
        .ok_or_else(invalid)?;
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match parts.as_slice() {
        ["b", id] => id.parse().map(BuildRef::Id).map_err(|_| invalid()),
        ["p", project, "builders", bucket, builder, number] => Ok(BuildRef::Number {
            project: project.to_string(),
            bucket: bucket.to_string(),
            builder: builder.replace("%20", " "),
            number: number.parse().map_err(|_| invalid())?,
        }),
        _ => Err(invalid()),
    }
}

#[async_trait]
pub trait BuildbucketClient: Send + Sync {
    async fn get_build(&self, build: &BuildRef) -> Result<Build, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_url_by_id() {
        assert_eq!(
            parse_build_url("https://ci.chromium.org/b/8912345").unwrap(),
            BuildRef::Id(8912345)
        );
    }

    #[test]
    fn test_parse_build_url_by_number() {
        assert_eq!(
            parse_build_url("https://ci.chromium.org/p/chromium/builders/ci/Linux%20Builder/42")
                .unwrap(),
            BuildRef::Number {
                project: "chromium".to_string(),
                bucket: "ci".to_string(),
                builder: "Linux Builder".to_string(),
                number: 42,
            }
        );
    }

    #[test]
    fn test_parse_build_url_invalid() {
        assert!(parse_build_url("https://ci.chromium.org/b/notanumber").is_err());
        assert!(parse_build_url("https://ci.chromium.org/x/1").is_err());
        assert!(parse_build_url("").is_err());
    }

    #[test]
    fn test_step_leaf_name() {
        let step = Step {
            name: "steps|compile".to_string(),
            status: BuildStatus::Failure,
        };
        assert_eq!(step.leaf_name(), "compile");
    }
}
