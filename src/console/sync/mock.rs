//! # Mock Route Table
//!
//! Serves GET requests from static fixtures while the store is in mock
//! mode. Routes are an ordered list of (pattern, handler) pairs and the
//! first pattern that matches wins; a matching handler may still decline
//! (e.g. unknown id), which is reported as "not found in mock".
//!
//! Patterns use `:name` for a captured path segment:
//!
//! ```rust
//! use lpfactory::console::sync::mock::MockRoutes;
//!
//! let routes = MockRoutes::fixtures();
//! assert!(routes.resolve("/clusters").is_some());
//! assert!(routes.resolve("/jobs/job-1").is_some());
//! assert!(routes.resolve("/unknown/path").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed route pattern such as `/jobs/:id/stream`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Captured params when `path` (without query) matches
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// What a handler sees of the request
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl MockRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

pub type MockHandler = Arc<dyn Fn(&MockRequest) -> Option<Value> + Send + Sync>;

struct MockRoute {
    pattern: RoutePattern,
    handler: MockHandler,
}

/// Ordered fixture routes
#[derive(Clone, Default)]
pub struct MockRoutes {
    routes: Vec<Arc<MockRoute>>,
}

impl std::fmt::Debug for MockRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRoutes")
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl MockRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; earlier routes take priority
    pub fn route<F>(mut self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&MockRequest) -> Option<Value> + Send + Sync + 'static,
    {
        self.routes.push(Arc::new(MockRoute {
            pattern: RoutePattern::parse(pattern),
            handler: Arc::new(handler),
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Fixture for `path` (query string allowed), if any
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let (route_path, query) = match path.split_once('?') {
            Some((route_path, query)) => (route_path, parse_query(query)),
            None => (path, HashMap::new()),
        };
        self.routes.iter().find_map(|route| {
            let params = route.pattern.matches(route_path)?;
            let request = MockRequest {
                params,
                query: query.clone(),
            };
            Some((route.handler)(&request))
        })?
    }

    /// The built-in LP Factory fixture set
    pub fn fixtures() -> Self {
        Self::new()
            .route("/health", |_| Some(json!({ "status": "ok", "mode": "mock" })))
            .route("/whoami", |_| {
                Some(json!({ "name": "mock-operator", "role": "admin" }))
            })
            .route("/inputs/projects", |_| Some(fixture_projects()))
            .route("/inputs/projects/:id", |req| {
                find_by_id(fixture_projects(), req.param("id")?)
            })
            .route("/jobs", |req| Some(filter_jobs(req)))
            .route("/jobs/:id", |req| find_by_id(fixture_jobs(), req.param("id")?))
            .route("/jobs/:id/stream", |req| {
                let id = req.param("id")?;
                find_by_id(fixture_jobs(), id)?;
                Some(json!(fixture_log_lines(id)))
            })
            .route("/clusters", |req| {
                Some(filter_by_project(fixture_clusters(), req.query("project_id")))
            })
            .route("/clusters/:id", |req| {
                find_by_id(fixture_clusters(), req.param("id")?)
            })
            .route("/templates", |_| Some(fixture_templates()))
            .route("/audit", |req| {
                Some(paginate(fixture_audit(), req))
            })
            .route("/scores", |req| {
                Some(filter_by_project(fixture_scores(), req.query("project_id")))
            })
            .route("/agents", |_| Some(fixture_agents()))
            .route("/agents/:id/suggestions", |req| {
                let agent_id = req.param("id")?;
                let suggestions = fixture_suggestions()
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter(|s| s["agent_id"] == agent_id)
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Some(Value::Array(suggestions))
            })
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn find_by_id(list: Value, id: &str) -> Option<Value> {
    list.as_array()?
        .iter()
        .find(|item| item["id"] == id)
        .cloned()
}

fn filter_by_project(list: Value, project_id: Option<&str>) -> Value {
    let Some(project_id) = project_id else {
        return list;
    };
    let items = list
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["project_id"] == project_id)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Value::Array(items)
}

fn paginate(list: Value, req: &MockRequest) -> Value {
    let offset = req
        .query("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let limit = req
        .query("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let items = list
        .as_array()
        .map(|items| items.iter().skip(offset).take(limit).cloned().collect())
        .unwrap_or_default();
    Value::Array(items)
}

fn filter_jobs(req: &MockRequest) -> Value {
    let jobs = filter_by_project(fixture_jobs(), req.query("project_id"));
    let jobs = match req.query("status") {
        Some(status) => Value::Array(
            jobs.as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter(|job| job["status"] == status)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        ),
        None => jobs,
    };
    paginate(jobs, req)
}

fn fixture_projects() -> Value {
    json!([
        { "id": "proj-acme", "name": "Acme Legal", "domain": "acme-legal.example" },
        { "id": "proj-solar", "name": "Solar Leads", "domain": "solarleads.example" }
    ])
}

fn fixture_clusters() -> Value {
    json!([
        { "id": "cl-1", "name": "Divorce lawyers", "status": "published", "project_id": "proj-acme", "page_count": 24 },
        { "id": "cl-2", "name": "Custody disputes", "status": "draft", "project_id": "proj-acme", "page_count": 8 },
        { "id": "cl-3", "name": "Home solar panels", "status": "generating", "project_id": "proj-solar", "page_count": 12 }
    ])
}

fn fixture_jobs() -> Value {
    json!([
        {
            "id": "job-1", "type": "create_cluster", "status": "succeeded",
            "project_id": "proj-acme", "cluster_id": "cl-1",
            "created_at": "2024-05-02T09:12:00Z", "updated_at": "2024-05-02T09:20:41Z"
        },
        {
            "id": "job-2", "type": "generate_pages", "status": "running",
            "project_id": "proj-solar", "cluster_id": "cl-3",
            "created_at": "2024-05-03T14:01:00Z", "updated_at": "2024-05-03T14:06:10Z"
        },
        {
            "id": "job-3", "type": "publish", "status": "failed",
            "project_id": "proj-acme", "cluster_id": "cl-2",
            "created_at": "2024-05-04T08:30:00Z", "updated_at": "2024-05-04T08:31:02Z",
            "error": "Template 'tpl-legal' missing hero section"
        }
    ])
}

fn fixture_log_lines(job_id: &str) -> Vec<String> {
    vec![
        format!("[{}] job accepted", job_id),
        format!("[{}] resolving template", job_id),
        format!("[{}] generating pages", job_id),
        format!("[{}] scoring pages", job_id),
        format!("[{}] done", job_id),
    ]
}

fn fixture_templates() -> Value {
    json!([
        { "id": "tpl-legal", "name": "Legal services", "description": "Trust-first layout with consultation form" },
        { "id": "tpl-solar", "name": "Solar quote", "description": "Savings calculator hero" }
    ])
}

fn fixture_audit() -> Value {
    json!([
        { "id": "ev-1", "action": "job.created", "actor": "mock-operator", "target": "job-1", "timestamp": "2024-05-02T09:12:00Z" },
        { "id": "ev-2", "action": "cluster.published", "actor": "engine", "target": "cl-1", "timestamp": "2024-05-02T09:20:41Z" },
        { "id": "ev-3", "action": "job.failed", "actor": "engine", "target": "job-3", "timestamp": "2024-05-04T08:31:02Z" }
    ])
}

fn fixture_scores() -> Value {
    json!([
        { "timestamp": "2024-05-01T00:00:00Z", "score": 71.5, "cluster_id": "cl-1", "project_id": "proj-acme" },
        { "timestamp": "2024-05-02T00:00:00Z", "score": 78.0, "cluster_id": "cl-1", "project_id": "proj-acme" },
        { "timestamp": "2024-05-03T00:00:00Z", "score": 64.25, "cluster_id": "cl-3", "project_id": "proj-solar" }
    ])
}

fn fixture_agents() -> Value {
    json!([
        { "id": "agent-copy", "name": "Copywriter", "provider_id": "openai", "model": "gpt-4o", "enabled": true },
        { "id": "agent-seo", "name": "SEO reviewer", "provider_id": "anthropic", "model": "claude-sonnet", "enabled": false }
    ])
}

fn fixture_suggestions() -> Value {
    json!([
        { "id": "sg-1", "agent_id": "agent-copy", "title": "Shorter hero headline", "body": "Cut the headline to 8 words.", "archived": false },
        { "id": "sg-2", "agent_id": "agent-seo", "title": "Add FAQ schema", "body": "Mark up the FAQ block.", "archived": false }
    ])
}
