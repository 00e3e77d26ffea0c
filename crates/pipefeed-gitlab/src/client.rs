//! [`Gateway`] implementation over the GitLab REST API (v4).

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use pipefeed_core::{
    AcceptOptions, BranchInfo, CommitDetail, Gateway, GatewayError, GatewayResult, JobSummary,
    MergeRequest, NewMergeRequest, PageMeta, PipelineDetail, PipelineId, PipelineSummary,
};

use crate::config::GitLabConfig;
use crate::wire;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const BRANCHES_PER_PAGE: &str = "100";

/// GitLab client bound to a single project.
pub struct GitLabGateway {
    http: reqwest::Client,
    /// `<base>/api/v4/projects/<id>`
    project_url: Url,
    token: String,
}

impl GitLabGateway {
    pub fn new(config: &GitLabConfig) -> GatewayResult<Self> {
        config.validate()?;

        let mut project_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Config(format!("invalid base_url: {e}")))?;
        project_url
            .path_segments_mut()
            .map_err(|_| GatewayError::Config("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            // `push` percent-encodes, so `group/project` stays one segment.
            .extend(["api", "v4", "projects", config.project.as_str()]);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            project_url,
            token: config.token.clone(),
        })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(&GitLabConfig::from_env())
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.project_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, path = url.path(), "gitlab request");
        self.http
            .request(method, url)
            .header(TOKEN_HEADER, self.token.as_str())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> GatewayResult<T> {
        let response = send(self.request(Method::GET, self.url(segments, query))).await?;
        decode(response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> GatewayResult<T> {
        let response = send(self.request(method, self.url(segments, &[])).json(body)).await?;
        decode(response).await
    }
}

/// Send and turn transport failures and non-2xx statuses into errors.
async fn send(request: RequestBuilder) -> GatewayResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::NotFound(path));
    }
    Err(GatewayError::Http {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn header_num<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Pagination metadata from GitLab's `X-*` headers. Missing values are zero,
/// except the current page which falls back to `requested_page`.
pub(crate) fn page_meta(headers: &HeaderMap, requested_page: u32) -> PageMeta {
    PageMeta {
        current_page: header_num(headers, "x-page").unwrap_or(requested_page),
        per_page: header_num(headers, "x-per-page").unwrap_or(0),
        total_pages: header_num(headers, "x-total-pages").unwrap_or(0),
        total_items: header_num(headers, "x-total").unwrap_or(0),
    }
}

#[async_trait]
impl Gateway for GitLabGateway {
    async fn list_pipelines(
        &self,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<(Vec<PipelineSummary>, PageMeta)> {
        let (page_s, per_page_s) = (page.to_string(), per_page.to_string());
        let url = self.url(
            &["pipelines"],
            &[
                ("page", page_s.as_str()),
                ("per_page", per_page_s.as_str()),
                ("order_by", "id"),
                ("sort", "desc"),
            ],
        );
        let response = send(self.request(Method::GET, url)).await?;
        let meta = page_meta(response.headers(), page);
        let pipelines: Vec<wire::Pipeline> = decode(response).await?;
        Ok((pipelines.into_iter().map(Into::into).collect(), meta))
    }

    async fn get_pipeline(&self, id: PipelineId) -> GatewayResult<PipelineDetail> {
        let id = id.to_string();
        let pipeline: wire::Pipeline = self.get(&["pipelines", &id], &[]).await?;
        Ok(pipeline.into())
    }

    async fn list_pipeline_jobs(&self, id: PipelineId) -> GatewayResult<Vec<JobSummary>> {
        let id = id.to_string();
        let jobs: Vec<wire::Job> = self
            .get(&["pipelines", &id, "jobs"], &[("per_page", "100")])
            .await?;
        Ok(jobs.into_iter().map(Into::into).collect())
    }

    async fn get_commit(&self, sha: &str) -> GatewayResult<CommitDetail> {
        let commit: wire::Commit = self.get(&["repository", "commits", sha], &[]).await?;
        Ok(commit.into())
    }

    async fn list_branches(&self) -> GatewayResult<Vec<BranchInfo>> {
        let branches: Vec<wire::Branch> = self
            .get(&["repository", "branches"], &[("per_page", BRANCHES_PER_PAGE)])
            .await?;
        Ok(branches.into_iter().map(Into::into).collect())
    }

    async fn create_branch(&self, name: &str, from_ref: &str) -> GatewayResult<BranchInfo> {
        let url = self.url(
            &["repository", "branches"],
            &[("branch", name), ("ref", from_ref)],
        );
        let response = send(self.request(Method::POST, url)).await?;
        let branch: wire::Branch = decode(response).await?;
        Ok(branch.into())
    }

    async fn list_open_merge_requests(
        &self,
        source: &str,
        target: &str,
    ) -> GatewayResult<Vec<MergeRequest>> {
        let mrs: Vec<wire::MergeRequestPayload> = self
            .get(
                &["merge_requests"],
                &[
                    ("state", "opened"),
                    ("source_branch", source),
                    ("target_branch", target),
                ],
            )
            .await?;
        Ok(mrs.into_iter().map(Into::into).collect())
    }

    async fn create_merge_request(&self, request: &NewMergeRequest) -> GatewayResult<MergeRequest> {
        let body = wire::CreateMergeRequestBody::from(request);
        let mr: wire::MergeRequestPayload = self
            .send_json(Method::POST, &["merge_requests"], &body)
            .await?;
        Ok(mr.into())
    }

    async fn get_merge_request(&self, iid: u64) -> GatewayResult<MergeRequest> {
        let iid = iid.to_string();
        let mr: wire::MergeRequestPayload = self.get(&["merge_requests", &iid], &[]).await?;
        Ok(mr.into())
    }

    async fn accept_merge_request(
        &self,
        iid: u64,
        options: &AcceptOptions,
    ) -> GatewayResult<MergeRequest> {
        let iid = iid.to_string();
        let body = wire::AcceptBody::from(options);
        let mr: wire::MergeRequestPayload = self
            .send_json(Method::PUT, &["merge_requests", &iid, "merge"], &body)
            .await?;
        Ok(mr.into())
    }
}
