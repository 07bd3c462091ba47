//! Typed Engine endpoints.
//!
//! Thin wrappers over [`SyncClient::request`] that build the path, assemble
//! the query string and decode the payload. Absent parameters and the
//! `"all"` sentinel are left out of the query entirely.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{decode_data, ByteStream, Method, RequestOptions, SyncClient};
use crate::console::state::ALL_PROJECTS;
use crate::shared::error::ApiResult;
use crate::shared::models::{
    Agent, AgentSuggestion, AuditEvent, Cluster, Identity, Job, NewAgentSuggestion, NewJob,
    Project, ScorePoint, Template,
};

/// Query-string assembly that skips absent values and the `"all"` sentinel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            let value = value.to_string();
            if !value.trim().is_empty() && value != ALL_PROJECTS {
                self.pairs.push((key.to_string(), value));
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `path` with `?query` appended when there is anything to append
    pub fn apply(&self, path: &str) -> String {
        if self.pairs.is_empty() {
            return path.to_string();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        format!("{}?{}", path, encoded)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    pub project_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl JobQuery {
    fn to_query(&self) -> Query {
        Query::new()
            .param("project_id", self.project_id.as_deref())
            .param("status", self.status.as_deref())
            .param("limit", self.limit)
            .param("offset", self.offset)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub project_id: Option<String>,
    pub action: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    fn to_query(&self) -> Query {
        Query::new()
            .param("project_id", self.project_id.as_deref())
            .param("action", self.action.as_deref())
            .param("limit", self.limit)
            .param("offset", self.offset)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreQuery {
    pub project_id: Option<String>,
    pub cluster_id: Option<String>,
    pub limit: Option<u32>,
}

impl ScoreQuery {
    fn to_query(&self) -> Query {
        Query::new()
            .param("project_id", self.project_id.as_deref())
            .param("cluster_id", self.cluster_id.as_deref())
            .param("limit", self.limit)
    }
}

/// Lists arrive either bare or as `{ "items": [...] }`
fn decode_list<T: DeserializeOwned>(path: &str, data: Option<Value>) -> ApiResult<Vec<T>> {
    let data = match data {
        Some(Value::Object(mut object)) if object.contains_key("items") => object.remove("items"),
        other => other,
    };
    decode_data(path, data)
}

impl SyncClient {
    async fn fetch_list<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<Vec<T>> {
        let data = self.request(Method::Get, path, None, options).await?;
        decode_list(path, data)
    }

    pub async fn whoami(&self) -> ApiResult<Identity> {
        self.get_json("/whoami", RequestOptions::default()).await
    }

    pub async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        self.fetch_list("/inputs/projects", RequestOptions::default()).await
    }

    pub async fn get_project(&self, project_id: &str) -> ApiResult<Project> {
        self.get_json(
            &format!("/inputs/projects/{}", project_id),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn list_jobs(&self, query: &JobQuery) -> ApiResult<Vec<Job>> {
        self.list_jobs_with(query, RequestOptions::default()).await
    }

    /// `list_jobs` with explicit options, for pollers that need cancellation
    pub async fn list_jobs_with(
        &self,
        query: &JobQuery,
        options: RequestOptions,
    ) -> ApiResult<Vec<Job>> {
        self.fetch_list(&query.to_query().apply("/jobs"), options).await
    }

    pub async fn get_job(&self, job_id: &str) -> ApiResult<Job> {
        self.get_job_with(job_id, RequestOptions::default()).await
    }

    /// `get_job` with explicit options, for pollers that need cancellation
    pub async fn get_job_with(&self, job_id: &str, options: RequestOptions) -> ApiResult<Job> {
        self.get_json(&format!("/jobs/{}", job_id), options).await
    }

    /// Submit a job. In mock mode the request body is echoed back.
    pub async fn create_job(&self, job: &NewJob) -> ApiResult<Value> {
        let body = serde_json::to_value(job)?;
        let data = self
            .request(Method::Post, "/jobs", Some(body), RequestOptions::default())
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn cancel_job(&self, job_id: &str) -> ApiResult<Option<Value>> {
        self.request(
            Method::Post,
            &format!("/jobs/{}/cancel", job_id),
            None,
            RequestOptions::default(),
        )
        .await
    }

    pub async fn stream_job_logs(
        &self,
        job_id: &str,
        cancel: Option<CancellationToken>,
    ) -> ApiResult<ByteStream> {
        self.open_stream(&format!("/jobs/{}/stream", job_id), cancel)
            .await
    }

    pub async fn list_clusters(&self, project_id: Option<&str>) -> ApiResult<Vec<Cluster>> {
        let path = Query::new().param("project_id", project_id).apply("/clusters");
        self.fetch_list(&path, RequestOptions::default()).await
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> ApiResult<Cluster> {
        self.get_json(&format!("/clusters/{}", cluster_id), RequestOptions::default())
            .await
    }

    pub async fn list_templates(&self) -> ApiResult<Vec<Template>> {
        self.fetch_list("/templates", RequestOptions::default()).await
    }

    pub async fn list_audit(&self, query: &AuditQuery) -> ApiResult<Vec<AuditEvent>> {
        self.fetch_list(&query.to_query().apply("/audit"), RequestOptions::default())
            .await
    }

    pub async fn list_scores(&self, query: &ScoreQuery) -> ApiResult<Vec<ScorePoint>> {
        self.fetch_list(&query.to_query().apply("/scores"), RequestOptions::default())
            .await
    }

    pub async fn list_agents(&self) -> ApiResult<Vec<Agent>> {
        self.fetch_list("/agents", RequestOptions::default()).await
    }

    pub async fn list_agent_suggestions(&self, agent_id: &str) -> ApiResult<Vec<AgentSuggestion>> {
        self.fetch_list(&format!("/agents/{}/suggestions", agent_id), RequestOptions::default())
            .await
    }

    pub async fn create_agent_suggestion(
        &self,
        agent_id: &str,
        suggestion: &NewAgentSuggestion,
    ) -> ApiResult<Value> {
        let body = serde_json::to_value(suggestion)?;
        let data = self
            .request(
                Method::Post,
                &format!("/agents/{}/suggestions", agent_id),
                Some(body),
                RequestOptions::default(),
            )
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn archive_agent_suggestion(&self, suggestion_id: &str) -> ApiResult<Option<Value>> {
        self.request(
            Method::Post,
            &format!("/agents/{}/archive", suggestion_id),
            None,
            RequestOptions::default(),
        )
        .await
    }
}
