//! Multi-role routing over groups of backend handles
//!
//! A [`Router`] owns one group per role, a shadow classifier, a gray
//! classifier and a pooler. Routing resolves a request context and an intent
//! to one live connection:
//!
//! 1. a connection pinned by a transaction wins unconditionally
//! 2. gray intent goes to the gray group when the gray classifier says so
//! 3. shadow traffic goes to a shadow group, preferring the matching one
//! 4. everything else goes to the primary group for the intent, falling back
//!    to the other primary group when that one is empty
pub mod classifier;
pub mod context;
pub mod pooler;
mod transaction;

pub use classifier::{Classifier, FnClassifier, LabelClassifier, NeverClassifier};
pub use context::{RequestContext, RequestMeta};
pub use pooler::{pooler_for, Pooler, RandomPooler, RoundRobinPooler};

use crate::config::SourceConfig;
use crate::core::{
    Backend, BackendFactory, BackendHandle, Construction, Group, InstanceRegistry, Members,
    Retirer,
};
use crate::error::{BackendError, SwitchyardError, SwitchyardResult};
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Store kind, deciding which roles a router accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Read, write, shadow-read and shadow-write roles
    Relational,
    /// Default (write), shadow (shadow-write) and gray roles
    Cache,
}

impl StoreKind {
    /// Roles a router of this kind accepts
    pub fn roles(&self) -> &'static [Role] {
        match self {
            StoreKind::Relational => &[Role::Read, Role::Write, Role::ShadowRead, Role::ShadowWrite],
            StoreKind::Cache => &[Role::Write, Role::ShadowWrite, Role::Gray],
        }
    }

    /// Roles of which at least one must be populated
    pub fn primary_roles(&self) -> &'static [Role] {
        match self {
            StoreKind::Relational => &[Role::Read, Role::Write],
            StoreKind::Cache => &[Role::Write],
        }
    }

    pub fn supports(&self, role: Role) -> bool {
        self.roles().contains(&role)
    }

    /// Name of a role as configured for this kind
    pub fn role_name(&self, role: Role) -> &'static str {
        match (self, role) {
            (StoreKind::Cache, Role::Write) => "default",
            (StoreKind::Cache, Role::ShadowWrite) => "shadow",
            _ => role.as_str(),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational"),
            StoreKind::Cache => write!(f, "cache"),
        }
    }
}

/// Traffic category mapped to one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Read,
    Write,
    ShadowRead,
    ShadowWrite,
    Gray,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Read,
        Role::Write,
        Role::ShadowRead,
        Role::ShadowWrite,
        Role::Gray,
    ];

    fn index(self) -> usize {
        match self {
            Role::Read => 0,
            Role::Write => 1,
            Role::ShadowRead => 2,
            Role::ShadowWrite => 3,
            Role::Gray => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::Write => "write",
            Role::ShadowRead => "shadow_read",
            Role::ShadowWrite => "shadow_write",
            Role::Gray => "gray",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller is about to do with the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
    Gray,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Read => write!(f, "read"),
            Intent::Write => write!(f, "write"),
            Intent::Gray => write!(f, "gray"),
        }
    }
}

/// Routes requests of one logical data source across role groups
pub struct Router<B: Backend> {
    name: String,
    kind: StoreKind,
    groups: [OnceLock<Group<B>>; 5],
    shadow: Arc<dyn Classifier>,
    gray: Arc<dyn Classifier>,
    pooler: Arc<dyn Pooler>,
    slow_threshold: Duration,
    error: RwLock<Option<SwitchyardError>>,
    update_lock: Mutex<()>,
    retirer: Retirer,
}

impl<B: Backend> Router<B> {
    pub fn builder<S: Into<String>>(name: S, kind: StoreKind) -> RouterBuilder<B> {
        RouterBuilder::new(name, kind)
    }

    /// Build a router for a configured source, constructing every endpoint
    /// through `registry`
    pub async fn from_config<F>(
        source: &SourceConfig,
        factory: &F,
        registry: &InstanceRegistry<B>,
    ) -> Arc<Self>
    where
        F: BackendFactory<Backend = B>,
    {
        let router = RouterBuilder::from_source(source).assemble();
        // failures stay inspectable through `error()`
        let _ = router.reconfigure(source, factory, registry).await;
        router
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    fn group(&self, role: Role) -> Option<&Group<B>> {
        self.groups[role.index()].get()
    }

    /// Current members of a role, empty when the role was never populated
    pub async fn members(&self, role: Role) -> Members<B> {
        match self.group(role) {
            Some(group) => group.members().await,
            None => Arc::new(Vec::new()),
        }
    }

    /// Aggregated error of the latest construction or reconfiguration
    ///
    /// A router with a configuration error must not be routed through.
    pub async fn error(&self) -> Option<SwitchyardError> {
        self.error.read().await.clone()
    }

    /// Number of retired backends still waiting to be closed
    pub fn pending_retirements(&self) -> usize {
        self.retirer.pending()
    }

    /// Set or replace the membership of one role
    pub async fn update_group(
        &self,
        role: Role,
        candidates: Vec<Construction<B>>,
    ) -> SwitchyardResult<()> {
        self.apply(vec![(role, candidates)]).await
    }

    /// Apply membership updates for several roles as one reconfiguration
    ///
    /// Retired backends are closed after their retirement delay. The router
    /// error is replaced by the errors of this apply, plus a configuration
    /// error when no primary role is left populated.
    pub async fn apply(&self, updates: Vec<(Role, Vec<Construction<B>>)>) -> SwitchyardResult<()> {
        let _guard = self.update_lock.lock().await;
        let mut errors = Vec::new();
        let mut retired = Vec::new();

        for (role, candidates) in updates {
            if !self.kind.supports(role) {
                errors.push(SwitchyardError::configuration(format!(
                    "{}: role {} is not available for {} stores",
                    self.name, role, self.kind
                )));
                continue;
            }

            let slot = &self.groups[role.index()];
            if slot.get().is_none() && candidates.is_empty() {
                continue;
            }
            let group = slot.get_or_init(|| Group::new(role));

            let candidates = self.reinstate(candidates).await;
            let change = group.update(candidates).await;
            errors.extend(change.errors);
            retired.extend(change.retired);
        }

        for handle in retired {
            // still serving another role
            if self.is_member(&handle).await {
                continue;
            }
            self.retirer.schedule(handle).await;
        }

        if !self.has_primary().await {
            let roles: Vec<_> = self
                .kind
                .primary_roles()
                .iter()
                .map(|role| self.kind.role_name(*role))
                .collect();
            errors.push(SwitchyardError::configuration(format!(
                "{}: at least one {} backend is required",
                self.name,
                roles.join(" or ")
            )));
        }

        let aggregated = SwitchyardError::aggregate(errors);
        *self.error.write().await = aggregated.clone();

        match aggregated {
            Some(e) => {
                tracing::error!(router = %self.name, error = %e, "router configuration has errors");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Re-apply a source configuration to this router
    ///
    /// Roles missing from `source` are emptied and their backends retired.
    pub async fn reconfigure<F>(
        &self,
        source: &SourceConfig,
        factory: &F,
        registry: &InstanceRegistry<B>,
    ) -> SwitchyardResult<()>
    where
        F: BackendFactory<Backend = B>,
    {
        if source.kind != self.kind {
            let e = SwitchyardError::configuration(format!(
                "{}: cannot apply a {} source to a {} router",
                self.name, source.kind, self.kind
            ));
            *self.error.write().await = Some(e.clone());
            return Err(e);
        }

        let mut updates = Vec::with_capacity(self.kind.roles().len());
        for role in self.kind.roles() {
            let settings = source.settings(*role);
            let candidates =
                join_all(settings.iter().map(|s| registry.construct(factory, s))).await;
            updates.push((*role, candidates));
        }

        self.apply(updates).await
    }

    /// Cancel pending retirements of re-admitted candidates
    ///
    /// A candidate whose retirement already closed it is rejected.
    async fn reinstate(&self, candidates: Vec<Construction<B>>) -> Vec<Construction<B>> {
        let mut admitted = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let candidate = match candidate {
                Ok(handle) => {
                    self.retirer.reprieve(&handle).await;
                    if handle.is_closed() {
                        Err(SwitchyardError::construction(
                            handle.name(),
                            BackendError::probe("backend was closed before admission"),
                        ))
                    } else {
                        Ok(handle)
                    }
                }
                Err(e) => Err(e),
            };
            admitted.push(candidate);
        }
        admitted
    }

    /// Whether any group currently holds this exact instance
    async fn is_member(&self, handle: &Arc<BackendHandle<B>>) -> bool {
        for role in Role::ALL {
            let Some(group) = self.group(role) else {
                continue;
            };
            if group.members().await.iter().any(|m| Arc::ptr_eq(m, handle)) {
                return true;
            }
        }
        false
    }

    async fn has_primary(&self) -> bool {
        for role in self.kind.primary_roles() {
            if let Some(group) = self.group(*role) {
                if !group.is_empty().await {
                    return true;
                }
            }
        }
        false
    }

    /// Resolve a request to a live connection
    pub async fn route(
        &self,
        ctx: &RequestContext<B::Connection>,
        intent: Intent,
    ) -> SwitchyardResult<B::Connection> {
        if let Some(pinned) = ctx.pinned() {
            tracing::trace!(router = %self.name, %intent, "routing to pinned transaction");
            return Ok(pinned.clone());
        }

        let handle = self.select(ctx.meta(), intent).await?;
        Ok(handle.connection())
    }

    /// Pick the backend handle for an intent, ignoring any pinned connection
    pub(crate) async fn select(
        &self,
        meta: &RequestMeta,
        intent: Intent,
    ) -> SwitchyardResult<Arc<BackendHandle<B>>> {
        for role in self.plan(meta, intent) {
            if let Some(handle) = self.pick(role, meta).await {
                tracing::trace!(
                    router = %self.name,
                    %intent,
                    %role,
                    backend = handle.name(),
                    "routed"
                );
                return Ok(handle);
            }
        }

        Err(SwitchyardError::configuration(format!(
            "{}: no backend available for {} traffic",
            self.name, intent
        )))
    }

    /// Roles to try, in order
    fn plan(&self, meta: &RequestMeta, intent: Intent) -> Vec<Role> {
        let mut plan = Vec::with_capacity(5);

        if intent == Intent::Gray && self.kind.supports(Role::Gray) && self.gray.judge(meta) {
            plan.push(Role::Gray);
        }

        if self.shadow.judge(meta) {
            match intent {
                Intent::Read => plan.extend([Role::ShadowRead, Role::ShadowWrite]),
                Intent::Write | Intent::Gray => plan.extend([Role::ShadowWrite, Role::ShadowRead]),
            }
        }

        match intent {
            Intent::Read => plan.extend([Role::Read, Role::Write]),
            Intent::Write | Intent::Gray => plan.extend([Role::Write, Role::Read]),
        }

        plan
    }

    async fn pick(&self, role: Role, meta: &RequestMeta) -> Option<Arc<BackendHandle<B>>> {
        let group = self.group(role)?;
        let members = group.members().await;
        let index = self.pooler.choose(meta, members.len())?;
        members.get(index).cloned()
    }

    /// Route, run `op` on the connection and log its cost
    ///
    /// Operations slower than the chosen backend's slow threshold are logged
    /// as warnings, failures as errors, everything else at trace level. A
    /// pinned connection is measured against the router's threshold.
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &RequestContext<B::Connection>,
        intent: Intent,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(B::Connection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SwitchyardError> + fmt::Display,
    {
        let (connection, limit) = match ctx.pinned() {
            Some(pinned) => (pinned.clone(), self.slow_threshold),
            None => {
                let handle = self.select(ctx.meta(), intent).await?;
                (handle.connection(), handle.slow_threshold())
            }
        };

        let started = Instant::now();
        let result = op(connection).await;
        let cost = started.elapsed();
        let cost_ms = cost.as_millis() as u64;
        let limit_ms = limit.as_millis() as u64;

        if cost > limit {
            tracing::warn!(router = %self.name, %intent, cost_ms, limit_ms, "[slow] operation");
        } else if let Err(e) = &result {
            tracing::error!(router = %self.name, %intent, cost_ms, error = %e, "operation failed");
        } else {
            tracing::trace!(router = %self.name, %intent, cost_ms, "operation done");
        }

        result
    }

    /// Close every backend of every group
    ///
    /// Pending retirements are cut short and closed first. One failing
    /// backend does not stop the others; the first error is returned and
    /// the rest are logged.
    pub async fn close(&self) -> SwitchyardResult<()> {
        self.retirer.shutdown().await;

        let mut errors = Vec::new();
        for role in Role::ALL {
            let Some(group) = self.group(role) else {
                continue;
            };
            for handle in group.members().await.iter() {
                if let Err(e) = handle.close().await {
                    errors.push(e);
                }
            }
        }

        let mut errors = errors.into_iter();
        match errors.next() {
            None => {
                tracing::info!(router = %self.name, "router closed");
                Ok(())
            }
            Some(first) => {
                for e in errors {
                    tracing::warn!(router = %self.name, error = %e, "additional close failure");
                }
                Err(first)
            }
        }
    }

    /// A deferred close of this router, for shutdown hooks
    pub fn closer(self: &Arc<Self>) -> impl FnOnce() -> BoxFuture<'static, SwitchyardResult<()>> {
        let router = Arc::clone(self);
        move || Box::pin(async move { router.close().await })
    }
}

/// Builder for [`Router`]
pub struct RouterBuilder<B: Backend> {
    name: String,
    kind: StoreKind,
    shadow: Arc<dyn Classifier>,
    gray: Arc<dyn Classifier>,
    pooler: Arc<dyn Pooler>,
    slow_threshold: Duration,
    initial: Vec<(Role, Vec<Construction<B>>)>,
}

impl<B: Backend> RouterBuilder<B> {
    pub fn new<S: Into<String>>(name: S, kind: StoreKind) -> Self {
        Self {
            name: name.into(),
            kind,
            shadow: Arc::new(NeverClassifier),
            gray: Arc::new(NeverClassifier),
            pooler: Arc::new(RandomPooler),
            slow_threshold: Duration::from_secs(10),
            initial: Vec::new(),
        }
    }

    /// Builder preset with the name, kind, pooler and slow threshold of a source
    pub fn from_source(source: &SourceConfig) -> Self {
        Self::new(source.name.clone(), source.kind)
            .pooler_arc(pooler_for(source.pooler))
            .slow_threshold(Duration::from_millis(source.tuning.slow_threshold_ms))
    }

    pub fn shadow_classifier<C: Classifier + 'static>(mut self, classifier: C) -> Self {
        self.shadow = Arc::new(classifier);
        self
    }

    pub fn gray_classifier<C: Classifier + 'static>(mut self, classifier: C) -> Self {
        self.gray = Arc::new(classifier);
        self
    }

    pub fn pooler<P: Pooler + 'static>(self, pooler: P) -> Self {
        self.pooler_arc(Arc::new(pooler))
    }

    pub fn pooler_arc(mut self, pooler: Arc<dyn Pooler>) -> Self {
        self.pooler = pooler;
        self
    }

    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Initial membership of a role
    pub fn role(mut self, role: Role, candidates: Vec<Construction<B>>) -> Self {
        self.initial.push((role, candidates));
        self
    }

    /// Build the router and apply the initial memberships
    ///
    /// Never fails: a router without a populated primary role is returned
    /// with its configuration error set.
    pub async fn build(mut self) -> Arc<Router<B>> {
        let initial = std::mem::take(&mut self.initial);
        let router = self.assemble();

        // failures stay inspectable through `error()`
        let _ = router.apply(initial).await;
        router
    }

    /// The router without any membership applied yet
    fn assemble(self) -> Arc<Router<B>> {
        Arc::new(Router {
            name: self.name,
            kind: self.kind,
            groups: [
                OnceLock::new(),
                OnceLock::new(),
                OnceLock::new(),
                OnceLock::new(),
                OnceLock::new(),
            ],
            shadow: self.shadow,
            gray: self.gray,
            pooler: self.pooler,
            slow_threshold: self.slow_threshold,
            error: RwLock::new(None),
            update_lock: Mutex::new(()),
            retirer: Retirer::new(),
        })
    }
}
