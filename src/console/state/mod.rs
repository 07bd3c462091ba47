//! # Application State
//!
//! The single global state record shared by every consumer of the control
//! core, the typed partial update applied to it, and the observable store
//! that owns it.
//!
//! ## Rules
//!
//! - State is always complete. A [`StatePatch`] is merged field by field,
//!   never replacing the whole record.
//! - `selected_project_id` is never empty; blank input becomes `"all"`.
//! - `is_reachable` is a runtime observation and is not persisted.
//!
//! ## Usage
//!
//! ```rust
//! use lpfactory::console::state::{AppStore, StatePatch};
//!
//! let store = AppStore::in_memory();
//! store.set_state(StatePatch::new().selected_project_id(""));
//! assert_eq!(store.get_state().selected_project_id, "all");
//! ```

pub mod persistence;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::console::config::Config;
use crate::shared::models::{Agent, AgentSuggestion, ConnectivityMode, Provider};

pub use persistence::{FileStorage, MemoryStorage, StateStorage, STATE_STORAGE_KEY};
pub use store::{AppStore, Subscription};

/// Project filter meaning "no filter"
pub const ALL_PROJECTS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Presentation-only preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    pub sidebar_expanded: bool,
    pub theme: Theme,
    /// CSS color string
    pub accent_color: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            sidebar_expanded: true,
            theme: Theme::System,
            accent_color: "#6366f1".to_string(),
        }
    }
}

/// Cross-page connectivity and UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub connectivity_mode: ConnectivityMode,
    pub endpoint_base_url: String,
    /// Sent as `X-API-KEY`. Persisted in cleartext alongside everything else.
    pub credential_token: String,
    pub selected_project_id: String,
    pub ui_preferences: UiPreferences,
    /// Last transport-level observation. Reset to `true` on every load.
    #[serde(skip, default = "reachable_on_load")]
    pub is_reachable: bool,
    pub providers: Vec<Provider>,
    pub agents: Vec<Agent>,
    pub agent_suggestions: Vec<AgentSuggestion>,
}

fn reachable_on_load() -> bool {
    true
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::from_config(&Config::new())
    }
}

impl ApplicationState {
    /// Hard-coded defaults, seeded from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            connectivity_mode: config.default_mode(),
            endpoint_base_url: config.engine_url().to_string(),
            credential_token: config.api_key().to_string(),
            selected_project_id: ALL_PROJECTS.to_string(),
            ui_preferences: UiPreferences::default(),
            is_reachable: true,
            providers: default_providers(),
            agents: Vec::new(),
            agent_suggestions: Vec::new(),
        }
    }

    /// Best-effort restore of persisted state on top of `defaults`.
    ///
    /// Missing fields keep their default. Anything unparseable yields
    /// `defaults` unchanged.
    pub fn restore(raw: &str, defaults: &ApplicationState) -> Option<Self> {
        let stored: serde_json::Value = serde_json::from_str(raw).ok()?;
        let serde_json::Value::Object(stored) = stored else {
            return None;
        };
        let mut merged = serde_json::to_value(defaults).ok()?;
        if let serde_json::Value::Object(ref mut base) = merged {
            base.extend(stored);
        }
        let mut state: ApplicationState = serde_json::from_value(merged).ok()?;
        state.selected_project_id = normalize_project_id(&state.selected_project_id);
        Some(state)
    }

    /// Merge a partial update into this state.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(mode) = patch.connectivity_mode {
            self.connectivity_mode = mode;
        }
        if let Some(url) = patch.endpoint_base_url {
            self.endpoint_base_url = normalize_base_url(&url);
        }
        if let Some(token) = patch.credential_token {
            self.credential_token = token;
        }
        if let Some(project) = patch.selected_project_id {
            self.selected_project_id = normalize_project_id(&project);
        }
        if let Some(prefs) = patch.ui_preferences {
            self.ui_preferences = prefs;
        }
        if let Some(reachable) = patch.is_reachable {
            self.is_reachable = reachable;
        }
        if let Some(providers) = patch.providers {
            self.providers = providers;
        }
        if let Some(agents) = patch.agents {
            self.agents = agents;
        }
        if let Some(suggestions) = patch.agent_suggestions {
            self.agent_suggestions = suggestions;
        }
    }

    pub fn is_mock(&self) -> bool {
        self.connectivity_mode == ConnectivityMode::Mock
    }
}

/// Base URLs are stored without trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

/// Blank project ids collapse to [`ALL_PROJECTS`].
pub fn normalize_project_id(raw: &str) -> String {
    if raw.trim().is_empty() {
        ALL_PROJECTS.to_string()
    } else {
        raw.to_string()
    }
}

fn default_providers() -> Vec<Provider> {
    vec![
        Provider {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            enabled: false,
            api_key: String::new(),
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
        },
        Provider {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            enabled: false,
            api_key: String::new(),
            models: vec!["claude-sonnet".to_string(), "claude-haiku".to_string()],
        },
    ]
}

/// Partial update of [`ApplicationState`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub connectivity_mode: Option<ConnectivityMode>,
    pub endpoint_base_url: Option<String>,
    pub credential_token: Option<String>,
    pub selected_project_id: Option<String>,
    pub ui_preferences: Option<UiPreferences>,
    pub is_reachable: Option<bool>,
    pub providers: Option<Vec<Provider>>,
    pub agents: Option<Vec<Agent>>,
    pub agent_suggestions: Option<Vec<AgentSuggestion>>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connectivity_mode(mut self, mode: ConnectivityMode) -> Self {
        self.connectivity_mode = Some(mode);
        self
    }

    pub fn endpoint_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_base_url = Some(url.into());
        self
    }

    pub fn credential_token(mut self, token: impl Into<String>) -> Self {
        self.credential_token = Some(token.into());
        self
    }

    pub fn selected_project_id(mut self, project: impl Into<String>) -> Self {
        self.selected_project_id = Some(project.into());
        self
    }

    pub fn ui_preferences(mut self, prefs: UiPreferences) -> Self {
        self.ui_preferences = Some(prefs);
        self
    }

    pub fn is_reachable(mut self, reachable: bool) -> Self {
        self.is_reachable = Some(reachable);
        self
    }

    pub fn providers(mut self, providers: Vec<Provider>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn agent_suggestions(mut self, suggestions: Vec<AgentSuggestion>) -> Self {
        self.agent_suggestions = Some(suggestions);
        self
    }
}
