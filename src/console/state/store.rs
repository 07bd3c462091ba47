//! # Observable Application Store
//!
//! Owns the [`ApplicationState`] for the lifetime of the process, persists
//! every mutation to an injected [`StateStorage`] and notifies subscribers
//! synchronously on the caller's thread.
//!
//! ## Concurrency
//!
//! Merges are serialized by a lock and are last-write-wins at patch
//! granularity. A read-modify-write that spans an `.await` must use
//! [`AppStore::update`], whose closure sees the state current at merge time.
//! That closure runs under the lock and must not call back into the store.
//!
//! Listeners run after the lock is released, in subscription order. A slow
//! listener delays the caller and every later listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use super::persistence::{MemoryStorage, StateStorage, STATE_STORAGE_KEY};
use super::{normalize_base_url, normalize_project_id, ApplicationState, StatePatch};
use crate::console::config::Config;
use crate::console::sync::SyncClient;
use crate::shared::models::{Agent, AgentSuggestion, ConnectivityMode, NewAgentSuggestion, Provider};

type Listener = Arc<dyn Fn(&ApplicationState) + Send + Sync>;

struct StoreInner {
    state: Mutex<Arc<ApplicationState>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    storage: Arc<dyn StateStorage>,
    defaults: ApplicationState,
}

/// Cheap, cloneable handle to one store instance
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for AppStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStore")
            .field("state", &self.get_state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl AppStore {
    /// Build a store seeded from `storage`, falling back to config defaults
    /// when nothing usable is stored. Never fails.
    pub fn new(storage: Arc<dyn StateStorage>, config: &Config) -> Self {
        let defaults = ApplicationState::from_config(config);
        let initial = match storage.get(STATE_STORAGE_KEY) {
            Ok(Some(raw)) => ApplicationState::restore(&raw, &defaults).unwrap_or_else(|| {
                tracing::warn!("Persisted state is unreadable, using defaults");
                defaults.clone()
            }),
            Ok(None) => defaults.clone(),
            Err(e) => {
                tracing::warn!("Failed to read persisted state: {}", e);
                defaults.clone()
            }
        };
        tracing::debug!(
            mode = %initial.connectivity_mode,
            base_url = %initial.endpoint_base_url,
            "AppStore initialized"
        );

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(Arc::new(initial)),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                storage,
                defaults,
            }),
        }
    }

    /// Isolated store with default configuration and throwaway storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), &Config::new())
    }

    /// Current state snapshot. Treat as read-only.
    pub fn get_state(&self) -> Arc<ApplicationState> {
        Arc::clone(&lock(&self.inner.state))
    }

    /// Merge `patch`, persist, then notify every subscriber.
    pub fn set_state(&self, patch: StatePatch) {
        self.commit(|_| Some(patch));
    }

    /// Function form of [`set_state`](Self::set_state): the patch is computed
    /// from the state current at merge time.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&ApplicationState) -> StatePatch,
    {
        self.commit(|current| Some(f(current)));
    }

    /// Register a listener invoked after every mutation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ApplicationState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Restore configuration defaults (persisted and notified like any mutation).
    /// Reachability is left as last observed.
    pub fn reset(&self) {
        let defaults = self.inner.defaults.clone();
        self.commit(|_| {
            Some(StatePatch {
                connectivity_mode: Some(defaults.connectivity_mode),
                endpoint_base_url: Some(defaults.endpoint_base_url),
                credential_token: Some(defaults.credential_token),
                selected_project_id: Some(defaults.selected_project_id),
                ui_preferences: Some(defaults.ui_preferences),
                is_reachable: None,
                providers: Some(defaults.providers),
                agents: Some(defaults.agents),
                agent_suggestions: Some(defaults.agent_suggestions),
            })
        });
    }

    // ------------------------------------------------------------------
    // Convenience accessors. Setters are no-ops when nothing changes.
    // ------------------------------------------------------------------

    pub fn is_reachable(&self) -> bool {
        self.get_state().is_reachable
    }

    pub fn set_reachable(&self, reachable: bool) -> bool {
        let changed = self.commit(|current| {
            (current.is_reachable != reachable).then(|| StatePatch::new().is_reachable(reachable))
        });
        if changed {
            if reachable {
                tracing::info!("Engine reachable");
            } else {
                tracing::warn!("Engine unreachable");
            }
        }
        changed
    }

    pub fn selected_project_id(&self) -> String {
        self.get_state().selected_project_id.clone()
    }

    pub fn set_selected_project_id(&self, project: &str) -> bool {
        let project = normalize_project_id(project);
        self.commit(|current| {
            (current.selected_project_id != project)
                .then(|| StatePatch::new().selected_project_id(project))
        })
    }

    pub fn connectivity_mode(&self) -> ConnectivityMode {
        self.get_state().connectivity_mode
    }

    pub fn set_connectivity_mode(&self, mode: ConnectivityMode) -> bool {
        let changed = self.commit(|current| {
            (current.connectivity_mode != mode).then(|| StatePatch::new().connectivity_mode(mode))
        });
        if changed {
            tracing::info!(%mode, "Connectivity mode changed");
        }
        changed
    }

    pub fn endpoint_base_url(&self) -> String {
        self.get_state().endpoint_base_url.clone()
    }

    pub fn set_endpoint_base_url(&self, url: &str) -> bool {
        let url = normalize_base_url(url);
        self.commit(|current| {
            (current.endpoint_base_url != url).then(|| StatePatch::new().endpoint_base_url(url))
        })
    }

    pub fn credential_token(&self) -> String {
        self.get_state().credential_token.clone()
    }

    pub fn set_credential_token(&self, token: &str) -> bool {
        self.commit(|current| {
            (current.credential_token != token)
                .then(|| StatePatch::new().credential_token(token))
        })
    }

    // ------------------------------------------------------------------
    // User-edited collections
    // ------------------------------------------------------------------

    /// Insert or replace a provider by id, keeping list order
    pub fn upsert_provider(&self, provider: Provider) {
        self.update(|current| {
            let mut providers = current.providers.clone();
            match providers.iter_mut().find(|p| p.id == provider.id) {
                Some(existing) => *existing = provider,
                None => providers.push(provider),
            }
            StatePatch::new().providers(providers)
        });
    }

    pub fn remove_provider(&self, provider_id: &str) -> bool {
        self.commit(|current| {
            current.providers.iter().any(|p| p.id == provider_id).then(|| {
                let providers = current
                    .providers
                    .iter()
                    .filter(|p| p.id != provider_id)
                    .cloned()
                    .collect();
                StatePatch::new().providers(providers)
            })
        })
    }

    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> bool {
        self.commit(|current| {
            let target = current.providers.iter().find(|p| p.id == provider_id)?;
            if target.enabled == enabled {
                return None;
            }
            let providers = current
                .providers
                .iter()
                .map(|p| {
                    let mut p = p.clone();
                    if p.id == provider_id {
                        p.enabled = enabled;
                    }
                    p
                })
                .collect();
            Some(StatePatch::new().providers(providers))
        })
    }

    pub fn upsert_agent(&self, agent: Agent) {
        self.update(|current| {
            let mut agents = current.agents.clone();
            match agents.iter_mut().find(|a| a.id == agent.id) {
                Some(existing) => *existing = agent,
                None => agents.push(agent),
            }
            StatePatch::new().agents(agents)
        });
    }

    pub fn remove_agent(&self, agent_id: &str) -> bool {
        self.commit(|current| {
            current.agents.iter().any(|a| a.id == agent_id).then(|| {
                let agents = current
                    .agents
                    .iter()
                    .filter(|a| a.id != agent_id)
                    .cloned()
                    .collect();
                StatePatch::new().agents(agents)
            })
        })
    }

    pub fn set_agent_suggestions(&self, suggestions: Vec<AgentSuggestion>) {
        self.set_state(StatePatch::new().agent_suggestions(suggestions));
    }

    /// Record a new suggestion locally and return it
    pub fn add_agent_suggestion(&self, agent_id: &str, new: NewAgentSuggestion) -> AgentSuggestion {
        let suggestion = AgentSuggestion::draft(agent_id, new);
        let added = suggestion.clone();
        self.update(move |state| {
            let mut suggestions = state.agent_suggestions.clone();
            suggestions.push(added);
            StatePatch::new().agent_suggestions(suggestions)
        });
        suggestion
    }

    /// Mark a suggestion archived. False when it is unknown or already archived.
    pub fn archive_agent_suggestion(&self, suggestion_id: &str) -> bool {
        self.commit(|current| {
            current
                .agent_suggestions
                .iter()
                .any(|s| s.id == suggestion_id && !s.archived)
                .then(|| {
                    let suggestions = current
                        .agent_suggestions
                        .iter()
                        .map(|s| {
                            let mut s = s.clone();
                            if s.id == suggestion_id {
                                s.archived = true;
                            }
                            s
                        })
                        .collect();
                    StatePatch::new().agent_suggestions(suggestions)
                })
        })
    }

    /// Probe `GET /health` and record the outcome in `is_reachable`.
    ///
    /// Any failure, or a response without an ok/success status marker,
    /// counts as unreachable.
    pub async fn check_health(&self, client: &SyncClient) -> bool {
        let healthy = match client.health().await {
            Ok(Some(body)) => has_healthy_marker(&body),
            Ok(None) => false,
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        };
        self.set_reachable(healthy);
        healthy
    }

    // ------------------------------------------------------------------

    /// Merge, persist and notify when `f` yields a patch. Returns whether it did.
    fn commit<F>(&self, f: F) -> bool
    where
        F: FnOnce(&ApplicationState) -> Option<StatePatch>,
    {
        let snapshot = {
            let mut guard = lock(&self.inner.state);
            let Some(patch) = f(&guard) else {
                return false;
            };
            let mut next = ApplicationState::clone(&guard);
            next.apply(patch);
            let next = Arc::new(next);
            *guard = Arc::clone(&next);
            // Persist under the lock so storage order matches merge order
            self.persist(&next);
            next
        };
        self.notify(&snapshot);
        true
    }

    fn persist(&self, state: &ApplicationState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize state: {}", e);
                return;
            }
        };
        // In-memory state stays authoritative when the write fails
        if let Err(e) = self.inner.storage.set(STATE_STORAGE_KEY, &raw) {
            tracing::warn!("Failed to persist state: {}", e);
        }
    }

    fn notify(&self, state: &ApplicationState) {
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }
}

fn has_healthy_marker(body: &Value) -> bool {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    body.get("status")
        .and_then(Value::as_str)
        .map(|status| {
            matches!(
                status.to_ascii_lowercase().as_str(),
                "ok" | "success" | "healthy"
            )
        })
        .unwrap_or(false)
}

/// Listener registration returned by [`AppStore::subscribe`].
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            lock(&inner.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
