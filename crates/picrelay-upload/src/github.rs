use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use picrelay_types::RepositoryId;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{direct_child, ContentApi, ContentWrite, DirectoryListing, WriteOutcome};
use crate::error::{UploadError, UploadResult};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Settings for [`GitHubContentApi`].
#[derive(Clone)]
pub struct GitHubClientConfig {
    pub api_base: String,
    pub token: String,
    pub user_agent: String,
    /// Bound on each remote call, connect included.
    pub timeout: Duration,
}

impl Default for GitHubClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            token: String::new(),
            user_agent: concat!("picrelay/", env!("CARGO_PKG_VERSION")).into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for GitHubClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClientConfig")
            .field("api_base", &self.api_base)
            .field("token", &"***")
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// [`ContentApi`] over the GitHub REST API.
///
/// `PUT /repos/{owner}/{repo}/contents/{path}` creates files. Listings read
/// the branch's recursive tree from `GET /repos/{owner}/{repo}/git/trees/{branch}`,
/// which is not subject to the 1000-entry cap of directory content listings;
/// GitHub flags the rare tree too large to return whole as `truncated`.
#[derive(Clone, Debug)]
pub struct GitHubContentApi {
    client: reqwest::Client,
    api_base: Url,
}

impl GitHubContentApi {
    pub fn new(config: GitHubClientConfig) -> UploadResult<Self> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| UploadError::Config(format!("api base {:?}: {e}", config.api_base)))?;
        if api_base.cannot_be_a_base() {
            return Err(UploadError::Config(format!("api base {:?} cannot hold a path", config.api_base)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if !config.token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("token {}", config.token))
                .map_err(|_| UploadError::Config("token contains characters not allowed in a header".into()))?;
            auth.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| UploadError::Config(e.to_string()))?;

        Ok(Self { client, api_base })
    }

    /// `{api_base}/repos/{owner}/{repo}/contents/{path}`, each segment
    /// percent-encoded.
    fn contents_url(&self, owner: &str, repository: &RepositoryId, path: &str) -> UploadResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| UploadError::Config("api base cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["repos", owner, repository.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// `{api_base}/repos/{owner}/{repo}/git/trees/{branch}`.
    fn tree_url(&self, owner: &str, repository: &RepositoryId, branch: &str) -> UploadResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| UploadError::Config("api base cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["repos", owner, repository.as_str(), "git", "trees"])
            .extend(branch.split('/'));
        Ok(url)
    }
}

/// Read a response body as JSON, keeping non-JSON text verbatim as a string.
async fn read_body(response: reqwest::Response) -> UploadResult<Value> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}

#[async_trait]
impl ContentApi for GitHubContentApi {
    async fn create_or_update(&self, write: &ContentWrite<'_>) -> UploadResult<WriteOutcome> {
        let url = self.contents_url(write.owner, write.repository, write.path)?;
        let request = PutContentRequest {
            message: write.message,
            content: STANDARD.encode(write.content),
            branch: write.branch,
        };

        tracing::debug!(%url, bytes = write.content.len(), "PUT contents");
        let response = self.client.put(url).json(&request).send().await?;
        let status = response.status();
        let body = read_body(response).await?;

        match status {
            StatusCode::OK | StatusCode::CREATED => {
                if body.get("content").is_none() {
                    return Err(UploadError::Transport(format!(
                        "malformed {status} response from contents API: {body}"
                    )));
                }
                Ok(WriteOutcome::Committed)
            }
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Ok(WriteOutcome::Conflict {
                status: status.as_u16(),
                body,
            }),
            _ => Ok(WriteOutcome::Rejected {
                status: status.as_u16(),
                body,
            }),
        }
    }

    async fn list_directory(
        &self,
        owner: &str,
        repository: &RepositoryId,
        branch: &str,
        dir: &str,
    ) -> UploadResult<DirectoryListing> {
        let url = self.tree_url(owner, repository, branch)?;
        let response = self.client.get(url).query(&[("recursive", "1")]).send().await?;
        let status = response.status();
        // 404: no such repository or branch. 409: repository without commits.
        if status == StatusCode::NOT_FOUND || status == StatusCode::CONFLICT {
            return Ok(DirectoryListing::default());
        }
        if !status.is_success() {
            let body = read_body(response).await?;
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(format!("malformed tree listing: {e}")))?;
        if tree.truncated {
            tracing::warn!(%repository, branch, "tree listing truncated by remote");
        }
        let names = tree
            .tree
            .iter()
            .filter(|e| e.kind == "blob")
            .filter_map(|e| direct_child(dir, &e.path))
            .map(str::to_string)
            .collect();
        Ok(DirectoryListing {
            names,
            truncated: tree.truncated,
        })
    }

    fn name(&self) -> &'static str {
        "github"
    }
}
