//! Enforcer: model, rules, role graphs and policy store behind one handle
//!
//! Reads (`enforce`, queries) share a read lock; mutations, loads and clears
//! take the write lock for their whole duration. The store is only written
//! while the write lock is held, and the in-memory model is only changed after
//! the store write succeeded.

mod management;
mod rbac_api;

use crate::adapter::{Adapter, MemoryAdapter};
use crate::cache::DecisionCache;
use crate::config::EnforcerConfig;
use crate::effect::{Effect, EffectStream};
use crate::error::{Error, Result};
use crate::events::{EventBus, PolicyEvent};
use crate::matcher::{EvalContext, FunctionMap, MatchFunction, Program, Scope};
use crate::model::Model;
use crate::rbac::{RoleManager, RoleRegistry};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle state of an [`Enforcer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcerState {
    /// Built, rules not loaded yet
    Unloaded,
    /// Rules loaded; every operation is available
    Loaded,
    /// Closed; only `state()` remains meaningful
    Closed,
}

impl std::fmt::Display for EnforcerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnforcerState::Unloaded => "unloaded",
            EnforcerState::Loaded => "loaded",
            EnforcerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which request, policy, effect and matcher keys an enforcement uses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnforceContext {
    pub request: String,
    pub policy: String,
    pub effect: String,
    pub matcher: String,
}

impl EnforceContext {
    /// Keys sharing a suffix: `new("2")` selects `r2`, `p2`, `e2`, `m2`
    pub fn new(suffix: &str) -> Self {
        EnforceContext {
            request: format!("r{}", suffix),
            policy: format!("p{}", suffix),
            effect: format!("e{}", suffix),
            matcher: format!("m{}", suffix),
        }
    }

    fn cache_key(&self) -> String {
        format!("{}/{}/{}/{}", self.request, self.policy, self.effect, self.matcher)
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}

/// Outcome of [`Enforcer::enforce_ex`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// The rule that decided the outcome, if one did
    pub rule: Option<Vec<String>>,
}

pub(crate) struct State {
    pub(crate) model: Model,
    pub(crate) roles: RoleRegistry,
    programs: BTreeMap<String, Program>,
    functions: FunctionMap,
    pub(crate) status: EnforcerState,
    pub(crate) auto_save: bool,
    log_enabled: bool,
}

impl State {
    pub(crate) fn require_loaded(&self) -> Result<()> {
        match self.status {
            EnforcerState::Loaded => Ok(()),
            other => Err(Error::NotLoaded(other)),
        }
    }

    fn evaluate(&self, ctx: &EnforceContext, request: &[String]) -> Result<(bool, Option<Vec<String>>)> {
        let kind = self.model.effect(&ctx.effect).ok_or_else(|| {
            Error::MatcherEval(format!("effect '{}' is not defined", ctx.effect))
        })?;
        let adhoc;
        let program = match self.compiled(ctx) {
            Some(program) => program,
            None => {
                adhoc = compile(&self.model, &self.functions, ctx)?;
                &adhoc
            }
        };

        let rules = self.model.policy(&ctx.policy);
        let eft = self.model.eft_index(&ctx.policy);
        let mut stream = EffectStream::new(kind, eft.is_some());

        if rules.is_empty() {
            if !program.uses_policy() {
                let matched = program.evaluate(&EvalContext {
                    request,
                    policy: &[],
                    roles: &self.roles,
                })?;
                if matched {
                    stream.push(Effect::Allow, 0);
                }
            }
        } else {
            for (index, rule) in rules.iter().enumerate() {
                let matched = program.evaluate(&EvalContext {
                    request,
                    policy: rule,
                    roles: &self.roles,
                })?;
                if !matched {
                    continue;
                }
                let effect = eft
                    .map(|i| Effect::from_eft(&rule[i]))
                    .unwrap_or(Effect::Allow);
                if stream.push(effect, index) {
                    break;
                }
            }
        }

        let (allowed, index) = stream.finish();
        Ok((allowed, index.and_then(|i| rules.get(i).cloned())))
    }

    /// Precompiled matcher, when `ctx` pairs it with the same request and
    /// policy keys as the model does
    fn compiled(&self, ctx: &EnforceContext) -> Option<&Program> {
        let pairing = self.model.pairing(&ctx.matcher);
        if pairing.request == ctx.request && pairing.policy == ctx.policy {
            self.programs.get(&ctx.matcher)
        } else {
            None
        }
    }

    fn recompile(&mut self) -> Result<()> {
        self.programs = compile_all(&self.model, &self.functions)?;
        Ok(())
    }
}

fn compile(model: &Model, functions: &FunctionMap, ctx: &EnforceContext) -> Result<Program> {
    let matcher = model
        .matcher(&ctx.matcher)
        .ok_or_else(|| Error::MatcherEval(format!("matcher '{}' is not defined", ctx.matcher)))?;
    let request_fields = model.request_fields(&ctx.request).ok_or_else(|| {
        Error::MatcherEval(format!("request definition '{}' is not defined", ctx.request))
    })?;
    let policy_fields = model.policy_fields(&ctx.policy).ok_or_else(|| {
        Error::MatcherEval(format!("policy definition '{}' is not defined", ctx.policy))
    })?;

    let scope = Scope {
        request_key: &ctx.request,
        request_fields,
        policy_key: &ctx.policy,
        policy_fields,
        roles: model.roles(),
    };
    Program::compile(matcher.source(), matcher.expr(), &scope, functions)
}

fn compile_all(model: &Model, functions: &FunctionMap) -> Result<BTreeMap<String, Program>> {
    model
        .matcher_keys()
        .map(|key| {
            let pairing = model.pairing(key);
            let ctx = EnforceContext {
                request: pairing.request,
                policy: pairing.policy,
                effect: pairing.effect,
                matcher: pairing.matcher,
            };
            compile(model, functions, &ctx).map(|program| (key.to_string(), program))
        })
        .collect()
}

pub(crate) fn owned<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|s| s.as_ref().to_string()).collect()
}

pub(crate) fn owned_rules<I, R, S>(rules: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rules
        .into_iter()
        .map(|rule| rule.into_iter().map(|s| s.as_ref().to_string()).collect())
        .collect()
}

/// Policy enforcer
///
/// `Enforcer` is `Send + Sync`; share it with `Arc<Enforcer>`.
///
/// # Examples
///
/// ```
/// use tollgate::{Enforcer, MemoryAdapter, Model};
///
/// # fn main() -> tollgate::Result<()> {
/// let model = Model::from_text(
///     "[request_definition]\nr = sub, obj, act\n\
///      [policy_definition]\np = sub, obj, act\n\
///      [role_definition]\ng = _, _\n\
///      [policy_effect]\ne = some(where (p.eft == allow))\n\
///      [matchers]\nm = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act\n",
/// )?;
/// let enforcer = Enforcer::new(model, MemoryAdapter::new())?;
///
/// enforcer.add_policy(&["data2_admin", "data2", "read"])?;
/// enforcer.add_role_for_user("alice", "data2_admin", None)?;
///
/// assert!(enforcer.enforce(&["alice", "data2", "read"])?);
/// assert!(!enforcer.enforce(&["bob", "data2", "read"])?);
/// # Ok(())
/// # }
/// ```
pub struct Enforcer {
    state: RwLock<State>,
    adapter: Mutex<Box<dyn Adapter>>,
    cache: Option<Mutex<DecisionCache>>,
    events: EventBus,
}

impl Enforcer {
    /// Build with default settings and load the rules from `adapter`
    pub fn new(model: Model, adapter: impl Adapter + 'static) -> Result<Self> {
        EnforcerBuilder::new(model).adapter(adapter).build()
    }

    pub fn builder(model: Model) -> EnforcerBuilder {
        EnforcerBuilder::new(model)
    }

    /// Build from configuration: model, store, logging, cache and auto-save
    pub fn from_config(config: &EnforcerConfig) -> Result<Self> {
        config.check()?;
        let mut builder = EnforcerBuilder::new(config.build_model()?)
            .boxed_adapter(config.build_adapter()?)
            .auto_save(config.auto_save)
            .log_enabled(config.log.enabled);
        if config.cache.enabled {
            builder = builder.cache(config.cache.capacity, config.cache.ttl());
        }
        builder.build()
    }

    /// Check `request` against the rules of `p` with matcher `m`
    pub fn enforce<S: AsRef<str>>(&self, request: &[S]) -> Result<bool> {
        self.enforce_with_context(&EnforceContext::default(), request)
    }

    /// Check `request` with the keys selected by `ctx`
    pub fn enforce_with_context<S: AsRef<str>>(
        &self,
        ctx: &EnforceContext,
        request: &[S],
    ) -> Result<bool> {
        let request = owned(request);
        let state = self.state.read();
        state.require_loaded()?;

        let cache_key = self.cache.as_ref().map(|_| ctx.cache_key());
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(allowed) = cache.lock().get(key, &request) {
                return Ok(allowed);
            }
        }

        let (allowed, rule) = state.evaluate(ctx, &request)?;

        // Insert under the read lock so a concurrent mutation cannot be
        // followed by a stale entry
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            cache.lock().put(key, &request, allowed);
        }

        if state.log_enabled {
            info!(matcher = %ctx.matcher, request = ?request, allowed, rule = ?rule, "Enforce decision");
        } else {
            debug!(matcher = %ctx.matcher, allowed, "Enforce decision");
        }
        Ok(allowed)
    }

    /// Like [`enforce`](Self::enforce), also returning the deciding rule;
    /// bypasses the decision cache
    pub fn enforce_ex<S: AsRef<str>>(&self, request: &[S]) -> Result<Decision> {
        let request = owned(request);
        let state = self.state.read();
        state.require_loaded()?;
        let (allowed, rule) = state.evaluate(&EnforceContext::default(), &request)?;
        Ok(Decision { allowed, rule })
    }

    /// Discard in-memory rules and reload them from the store
    ///
    /// On failure the previous rules stay in place.
    pub fn load_policy(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.status == EnforcerState::Closed {
            return Err(Error::NotLoaded(EnforcerState::Closed));
        }

        let mut fresh = state.model.clone();
        fresh.clear_policy();
        self.adapter.lock().load_policy(&mut fresh)?;

        let state = &mut *state;
        state.model = fresh;
        state.roles.rebuild(&state.model);
        state.status = EnforcerState::Loaded;
        let rules = state.model.rule_count();
        self.clear_cache();

        info!(rules, "Loaded policy");
        self.events.publish(PolicyEvent::PolicyLoaded { rules });
        Ok(())
    }

    /// Replace the store's contents with the in-memory rules
    pub fn save_policy(&self) -> Result<()> {
        let state = self.state.read();
        state.require_loaded()?;
        self.adapter.lock().save_policy(&state.model)?;

        let rules = state.model.rule_count();
        info!(rules, "Saved policy");
        self.events.publish(PolicyEvent::PolicySaved { rules });
        Ok(())
    }

    /// Remove every rule, from the store too when auto-save is on
    pub fn clear_policy(&self) -> Result<()> {
        let mut state = self.state.write();
        state.require_loaded()?;
        if state.auto_save {
            self.adapter.lock().clear_policy()?;
        }

        let state = &mut *state;
        state.model.clear_policy();
        state.roles.rebuild(&state.model);
        self.clear_cache();

        info!("Cleared policy");
        self.events.publish(PolicyEvent::PolicyCleared);
        Ok(())
    }

    /// Move to `Closed`; later operations fail with `NotLoaded`
    pub fn close(&self) {
        let mut state = self.state.write();
        if state.status != EnforcerState::Closed {
            state.status = EnforcerState::Closed;
            self.clear_cache();
            self.events.close();
            info!("Closed enforcer");
        }
    }

    pub fn state(&self) -> EnforcerState {
        self.state.read().status
    }

    /// Write mutations through to the store (on by default)
    pub fn set_auto_save(&self, auto_save: bool) {
        self.state.write().auto_save = auto_save;
    }

    pub fn is_auto_save(&self) -> bool {
        self.state.read().auto_save
    }

    /// Snapshot of the model and its rules
    pub fn model(&self) -> Model {
        self.state.read().model.clone()
    }

    /// Register a matcher function and recompile the matchers
    ///
    /// On a compile failure the previous function set stays active.
    pub fn add_function(&self, name: impl Into<String>, function: MatchFunction) -> Result<()> {
        let mut state = self.state.write();
        let previous = state.functions.clone();
        state.functions.insert(name, function);
        if let Err(e) = state.recompile() {
            state.functions = previous;
            return Err(e);
        }
        self.clear_cache();
        Ok(())
    }

    /// Receive a [`PolicyEvent`] after every successful mutation
    pub fn subscribe(&self) -> crossbeam::channel::Receiver<PolicyEvent> {
        self.events.subscribe()
    }

    pub fn cached_decisions(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Enforcer")
            .field("state", &state.status)
            .field("rules", &state.model.rule_count())
            .field("auto_save", &state.auto_save)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

/// Builder for customizing Enforcer construction
///
/// # Examples
///
/// ```
/// use tollgate::{match_function, EnforcerBuilder, Model, Value};
///
/// # fn main() -> tollgate::Result<()> {
/// let model = Model::from_text(
///     "[request_definition]\nr = sub, obj\n\
///      [policy_definition]\np = sub, obj\n\
///      [policy_effect]\ne = some(where (p.eft == allow))\n\
///      [matchers]\nm = r.sub == p.sub && prefix(r.obj, p.obj)\n",
/// )?;
/// let enforcer = EnforcerBuilder::new(model)
///     .function(
///         "prefix",
///         match_function(|args| {
///             let key = args[0].as_str().unwrap_or_default();
///             let prefix = args[1].as_str().unwrap_or_default();
///             Ok(Value::Bool(key.starts_with(prefix)))
///         }),
///     )
///     .cache(100, None)
///     .build()?;
///
/// enforcer.add_policy(&["alice", "/docs/"])?;
/// assert!(enforcer.enforce(&["alice", "/docs/readme"])?);
/// # Ok(())
/// # }
/// ```
pub struct EnforcerBuilder {
    model: Model,
    adapter: Option<Box<dyn Adapter>>,
    functions: FunctionMap,
    role_managers: BTreeMap<String, Box<dyn RoleManager>>,
    cache: Option<(usize, Option<Duration>)>,
    auto_save: bool,
    log_enabled: bool,
    auto_load: bool,
}

impl EnforcerBuilder {
    pub fn new(model: Model) -> Self {
        EnforcerBuilder {
            model,
            adapter: None,
            functions: FunctionMap::with_builtins(),
            role_managers: BTreeMap::new(),
            cache: None,
            auto_save: true,
            log_enabled: false,
            auto_load: true,
        }
    }

    /// Policy store (defaults to an empty [`MemoryAdapter`])
    pub fn adapter(self, adapter: impl Adapter + 'static) -> Self {
        self.boxed_adapter(Box::new(adapter))
    }

    pub fn boxed_adapter(mut self, adapter: Box<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Register a matcher function
    pub fn function(mut self, name: impl Into<String>, function: MatchFunction) -> Self {
        self.functions.insert(name, function);
        self
    }

    /// Use `manager` for role key `ptype` instead of a default one
    pub fn role_manager(mut self, ptype: impl Into<String>, manager: impl RoleManager + 'static) -> Self {
        self.role_managers.insert(ptype.into(), Box::new(manager));
        self
    }

    /// Cache up to `capacity` decisions, optionally expiring after `ttl`
    pub fn cache(mut self, capacity: usize, ttl: Option<Duration>) -> Self {
        self.cache = Some((capacity, ttl));
        self
    }

    pub fn auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    /// Log every decision at info level
    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// Load rules during `build` (default); when off the enforcer starts
    /// `Unloaded` until [`Enforcer::load_policy`]
    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }

    /// Compile the matchers, then load the rules if auto-load is on
    pub fn build(self) -> Result<Enforcer> {
        let programs = compile_all(&self.model, &self.functions)?;
        let roles = RoleRegistry::new(&self.model, self.role_managers)?;

        let cache = self.cache.map(|(capacity, ttl)| {
            let cache = DecisionCache::new(capacity);
            Mutex::new(match ttl {
                Some(ttl) => cache.with_ttl(ttl),
                None => cache,
            })
        });

        info!(
            matchers = programs.len(),
            auto_save = self.auto_save,
            cache = cache.is_some(),
            "Building enforcer"
        );

        let enforcer = Enforcer {
            state: RwLock::new(State {
                model: self.model,
                roles,
                programs,
                functions: self.functions,
                status: EnforcerState::Unloaded,
                auto_save: self.auto_save,
                log_enabled: self.log_enabled,
            }),
            adapter: Mutex::new(
                self.adapter
                    .unwrap_or_else(|| Box::new(MemoryAdapter::new())),
            ),
            cache,
            events: EventBus::new(),
        };

        if self.auto_load {
            enforcer.load_policy()?;
        }
        Ok(enforcer)
    }
}
