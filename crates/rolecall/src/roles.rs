//! Three fixed agent roles, one client each, with per-role usage accounting.
//!
//! The planner decomposes work, the executor carries it out, and the
//! reflector reviews the result. [`RoleManager`] owns one [`LlmClient`] per
//! role and accumulates token and cost totals per role. Usage sits behind a
//! separate mutex per role, so concurrent calls on different roles never
//! contend and the lock is never held across an `.await`.

use crate::api::transport::Transport;
use crate::client::LlmClient;
use crate::config::{ClientConfig, RolesConfig};
use crate::error::{LlmError, Result};
use crate::factory::{ClientFactory, Environment};
use crate::providers::Provider;
use crate::{ChatRequest, ChatResponse};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// An agent role.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Executor,
    Reflector,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Planner, Role::Executor, Role::Reflector];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Executor => "executor",
            Role::Reflector => "reflector",
        }
    }

    fn index(self) -> usize {
        match self {
            Role::Planner => 0,
            Role::Executor => 1,
            Role::Reflector => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == name)
            .ok_or_else(|| {
                LlmError::Configuration(format!(
                    "unknown role '{s}' (expected planner, executor, or reflector)"
                ))
            })
    }
}

/// Cumulative usage for one role (or a sum across roles).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
    pub request_count: u64,
}

impl UsageStats {
    /// Record one completed call.
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, cost: f64) {
        self.prompt_tokens += u64::from(prompt_tokens);
        self.completion_tokens += u64::from(completion_tokens);
        self.total_tokens += u64::from(prompt_tokens) + u64::from(completion_tokens);
        self.total_cost += cost;
        self.request_count += 1;
    }

    /// Add another set of totals into this one.
    pub fn merge(&mut self, other: &UsageStats) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_cost += other.total_cost;
        self.request_count += other.request_count;
    }

    pub fn summary(&self) -> String {
        format!(
            "requests: {}, tokens: {} prompt + {} completion = {} total, cost: ${:.4}",
            self.request_count,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            self.total_cost,
        )
    }
}

/// One client per role.
#[derive(Debug)]
pub struct RoleClients {
    pub planner: LlmClient,
    pub executor: LlmClient,
    pub reflector: LlmClient,
}

impl RoleClients {
    pub fn get(&self, role: Role) -> &LlmClient {
        match role {
            Role::Planner => &self.planner,
            Role::Executor => &self.executor,
            Role::Reflector => &self.reflector,
        }
    }

    /// Build all three clients, failing on the first invalid config.
    fn build(config: &RolesConfig, create: impl Fn(&ClientConfig) -> Result<LlmClient>) -> Result<Self> {
        let build_one = |role: Role| {
            create(config.for_role(role)).map_err(|e| match e {
                LlmError::Configuration(msg) => LlmError::Configuration(format!("{role}: {msg}")),
                other => other,
            })
        };
        Ok(Self {
            planner: build_one(Role::Planner)?,
            executor: build_one(Role::Executor)?,
            reflector: build_one(Role::Reflector)?,
        })
    }
}

/// Snapshot of every role's usage.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct RoleUsage {
    pub planner: UsageStats,
    pub executor: UsageStats,
    pub reflector: UsageStats,
}

impl RoleUsage {
    pub fn get(&self, role: Role) -> &UsageStats {
        match role {
            Role::Planner => &self.planner,
            Role::Executor => &self.executor,
            Role::Reflector => &self.reflector,
        }
    }
}

/// Display row for one role's configuration.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RoleSummary {
    pub role: Role,
    pub provider: Provider,
    pub model: String,
}

impl std::fmt::Display for RoleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}/{}", self.role, self.provider, self.model)
    }
}

/// Where [`RoleManager::reinitialize`] gets its environment and transport.
enum ClientSource {
    Process,
    Injected {
        env: Environment,
        transport: Arc<dyn Transport>,
    },
}

impl ClientSource {
    fn build(&self, config: &RolesConfig) -> Result<RoleClients> {
        match self {
            ClientSource::Process => RoleClients::build(config, ClientFactory::create),
            ClientSource::Injected { env, transport } => RoleClients::build(config, |c| {
                ClientFactory::create_with(c, env, Arc::clone(transport))
            }),
        }
    }
}

/// Owns the three role clients and their usage totals.
pub struct RoleManager {
    clients: RoleClients,
    usage: [Mutex<UsageStats>; 3],
    source: ClientSource,
}

impl RoleManager {
    /// Build all three clients from the process environment. Any invalid
    /// role config aborts construction.
    pub fn new(config: &RolesConfig) -> Result<Self> {
        let source = ClientSource::Process;
        let clients = source.build(config)?;
        Ok(Self::assemble(clients, source))
    }

    /// Build all three clients against an explicit environment and transport.
    pub fn with_environment(
        config: &RolesConfig,
        env: &Environment,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let source = ClientSource::Injected {
            env: env.clone(),
            transport,
        };
        let clients = source.build(config)?;
        Ok(Self::assemble(clients, source))
    }

    /// Wrap clients the caller already built.
    pub fn from_clients(clients: RoleClients) -> Self {
        Self::assemble(clients, ClientSource::Process)
    }

    fn assemble(clients: RoleClients, source: ClientSource) -> Self {
        let manager = Self {
            clients,
            usage: Default::default(),
            source,
        };
        for summary in manager.config_summary() {
            debug!("Role ready: {summary}");
        }
        manager
    }

    pub fn client(&self, role: Role) -> &LlmClient {
        self.clients.get(role)
    }

    fn slot(&self, role: Role) -> std::sync::MutexGuard<'_, UsageStats> {
        self.usage[role.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one call's tokens and cost to `role`'s totals.
    pub fn update_usage(&self, role: Role, prompt_tokens: u32, completion_tokens: u32, cost: f64) {
        self.slot(role).record(prompt_tokens, completion_tokens, cost);
    }

    /// Copy of `role`'s totals.
    pub fn usage_stats(&self, role: Role) -> UsageStats {
        *self.slot(role)
    }

    /// Sum across all roles.
    pub fn total_usage(&self) -> UsageStats {
        let mut total = UsageStats::default();
        for role in Role::ALL {
            total.merge(&self.usage_stats(role));
        }
        total
    }

    pub fn all_usage(&self) -> RoleUsage {
        RoleUsage {
            planner: self.usage_stats(Role::Planner),
            executor: self.usage_stats(Role::Executor),
            reflector: self.usage_stats(Role::Reflector),
        }
    }

    pub fn reset_usage(&self, role: Role) {
        *self.slot(role) = UsageStats::default();
    }

    pub fn reset_all_usage(&self) {
        for role in Role::ALL {
            self.reset_usage(role);
        }
    }

    /// Whether every role has a usable client.
    pub fn is_ready(&self) -> bool {
        Role::ALL
            .iter()
            .all(|role| !self.client(*role).model().trim().is_empty())
    }

    pub fn config_summary(&self) -> Vec<RoleSummary> {
        Role::ALL
            .into_iter()
            .map(|role| {
                let client = self.client(role);
                RoleSummary {
                    role,
                    provider: client.provider(),
                    model: client.model().to_string(),
                }
            })
            .collect()
    }

    /// Rebuild every client from `config`. Either all three are replaced or,
    /// on error, none are. Usage totals are kept.
    pub fn reinitialize(&mut self, config: &RolesConfig) -> Result<()> {
        let clients = self.source.build(config)?;
        self.clients = clients;
        info!("Role clients reinitialized");
        for summary in self.config_summary() {
            debug!("Role ready: {summary}");
        }
        Ok(())
    }

    /// Send `request` with `role`'s client and record its usage.
    pub async fn chat(&self, role: Role, request: &ChatRequest) -> Result<ChatResponse> {
        let client = self.client(role);
        let response = client.chat(request).await?;
        let usage = response.usage;
        let cost = client.calculate_cost(usage.prompt_tokens, usage.completion_tokens);
        self.update_usage(role, usage.prompt_tokens, usage.completion_tokens, cost);
        debug!(
            "{role} call: {} prompt + {} completion tokens, ${cost:.6}",
            usage.prompt_tokens, usage.completion_tokens
        );
        Ok(response)
    }
}

impl std::fmt::Debug for RoleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleManager")
            .field("clients", &self.clients)
            .field("usage", &self.all_usage())
            .finish()
    }
}
