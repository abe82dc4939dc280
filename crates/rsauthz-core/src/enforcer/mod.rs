//! The enforcement orchestrator.
//!
//! An `Enforcer` binds a model, the predicate registry, one role
//! manager per role section, and the compiled-expression cache, and
//! answers `enforce` requests by streaming policy rows through the
//! matcher and the model's effect strategy.

mod management;
mod rbac_api;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::Adapter;
use crate::error::{EngineError, EngineResult};
use crate::expr::{evaluate_bool, Bindings, EvalContext, ExpressionCache, FunctionMap, MatchFn};
use crate::effect::{Effect, EffectStream};
use crate::model::{Model, SectionKind};
use crate::rbac::{DefaultRoleManager, RoleConfig, SharedRoleManager};

/// Section keys for one enforcement: which named `r`/`p`/`e`/`m`
/// definitions to use. The default targets the unsuffixed sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforceContext {
    pub r_key: String,
    pub p_key: String,
    pub e_key: String,
    pub m_key: String,
}

impl EnforceContext {
    /// Context for the suffixed alternates, e.g. `new("2")` selects
    /// `r2`/`p2`/`e2`/`m2`.
    pub fn new(suffix: &str) -> Self {
        Self {
            r_key: format!("r{suffix}"),
            p_key: format!("p{suffix}"),
            e_key: format!("e{suffix}"),
            m_key: format!("m{suffix}"),
        }
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}

/// A decision together with the policy row that determined it, when one
/// did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforceResult {
    pub allowed: bool,
    /// The determining policy row; empty when no single row decided
    /// (default-deny fall-through, empty-policy matchers, disabled
    /// enforcers).
    pub explain: Vec<String>,
}

/// The authorization decision engine.
pub struct Enforcer {
    model: Model,
    fm: FunctionMap,
    role_managers: HashMap<String, SharedRoleManager>,
    expr_cache: ExpressionCache,
    role_config: RoleConfig,
    enabled: bool,
    auto_build_role_links: bool,
}

impl Enforcer {
    /// Builds an enforcer over an already-populated model and constructs
    /// the role graphs from its role rows.
    pub fn new(model: Model) -> EngineResult<Enforcer> {
        Self::with_role_config(model, RoleConfig::default())
    }

    pub fn with_role_config(model: Model, role_config: RoleConfig) -> EngineResult<Enforcer> {
        let mut enforcer = Enforcer {
            model,
            fm: FunctionMap::default(),
            role_managers: HashMap::new(),
            expr_cache: ExpressionCache::new(),
            role_config,
            enabled: true,
            auto_build_role_links: true,
        };
        for key in enforcer.model.section_keys(SectionKind::Role) {
            enforcer.role_managers.insert(
                key,
                Arc::new(RwLock::new(DefaultRoleManager::new(
                    enforcer.role_config.clone(),
                ))) as SharedRoleManager,
            );
        }
        enforcer.build_role_links()?;
        Ok(enforcer)
    }

    /// Parses the model text and constructs an empty enforcer; rows
    /// arrive through an adapter or the management API.
    pub fn from_model_text(text: &str) -> EngineResult<Enforcer> {
        Self::new(text.parse()?)
    }

    /// Parses the model text and loads rows from the adapter.
    pub fn with_adapter(text: &str, adapter: &dyn Adapter) -> EngineResult<Enforcer> {
        let mut model: Model = text.parse()?;
        adapter.load_policy(&mut model)?;
        Self::new(model)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Registers a custom predicate callable from matcher expressions.
    pub fn add_function(&mut self, name: impl Into<String>, f: MatchFn) {
        self.fm.add_function(name, f);
    }

    /// A disabled enforcer allows every request without evaluation.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether role-row mutations rebuild the role graphs immediately
    /// (the default). When off, the host calls `build_role_links` after
    /// a batch of changes.
    pub fn set_auto_build_role_links(&mut self, auto: bool) {
        self.auto_build_role_links = auto;
    }

    /// The role manager backing one role section (`g`, `g2`, ...).
    pub fn role_manager(&self, key: &str) -> Option<SharedRoleManager> {
        self.role_managers.get(key).map(Arc::clone)
    }

    /// Rebuilds every role graph from the current role rows. A role row
    /// carries member and role, plus an optional third domain field.
    pub fn build_role_links(&mut self) -> EngineResult<()> {
        for (key, rm) in &self.role_managers {
            let mut rm = rm.write();
            rm.clear();
            for row in self.model.get_policy(SectionKind::Role, key) {
                let (Some(name1), Some(name2)) = (row.first(), row.get(1)) else {
                    return Err(EngineError::MalformedModel {
                        message: format!("role row in `{key}` has fewer than 2 fields"),
                    });
                };
                rm.add_link(name1, name2, row.get(2).map(String::as_str));
            }
        }
        Ok(())
    }

    /// Decides a request against the default sections.
    pub fn enforce<S: AsRef<str>>(&self, request: &[S]) -> EngineResult<bool> {
        self.enforce_with_context(&EnforceContext::default(), request)
    }

    /// Decides a request and reports the determining policy row.
    pub fn enforce_ex<S: AsRef<str>>(&self, request: &[S]) -> EngineResult<EnforceResult> {
        self.enforce_ex_with_context(&EnforceContext::default(), request)
    }

    pub fn enforce_with_context<S: AsRef<str>>(
        &self,
        ctx: &EnforceContext,
        request: &[S],
    ) -> EngineResult<bool> {
        Ok(self.enforce_ex_with_context(ctx, request)?.allowed)
    }

    pub fn enforce_ex_with_context<S: AsRef<str>>(
        &self,
        ctx: &EnforceContext,
        request: &[S],
    ) -> EngineResult<EnforceResult> {
        let request: Vec<String> = request.iter().map(|s| s.as_ref().to_string()).collect();
        self.private_enforce(ctx, &request)
    }

    /// Decides each request independently; the first failure aborts the
    /// batch.
    pub fn batch_enforce<S: AsRef<str>>(&self, requests: &[Vec<S>]) -> EngineResult<Vec<bool>> {
        requests.iter().map(|request| self.enforce(request)).collect()
    }

    pub async fn enforce_async<S: AsRef<str>>(&self, request: &[S]) -> EngineResult<bool> {
        self.enforce(request)
    }

    pub async fn enforce_ex_async<S: AsRef<str>>(
        &self,
        request: &[S],
    ) -> EngineResult<EnforceResult> {
        self.enforce_ex(request)
    }

    pub async fn batch_enforce_async<S: AsRef<str>>(
        &self,
        requests: &[Vec<S>],
    ) -> EngineResult<Vec<bool>> {
        self.batch_enforce(requests)
    }

    fn private_enforce(
        &self,
        ctx: &EnforceContext,
        request: &[String],
    ) -> EngineResult<EnforceResult> {
        if !self.enabled {
            debug!("enforcement disabled, allowing");
            return Ok(EnforceResult {
                allowed: true,
                explain: Vec::new(),
            });
        }

        let r_assertion = self.model.required_assertion(SectionKind::Request, &ctx.r_key)?;
        if request.len() != r_assertion.tokens.len() {
            return Err(EngineError::RequestArityMismatch {
                expected: r_assertion.tokens.len(),
                actual: request.len(),
            });
        }
        let p_assertion = self.model.required_assertion(SectionKind::Policy, &ctx.p_key)?;
        let matcher = self
            .model
            .required_assertion(SectionKind::Matcher, &ctx.m_key)?
            .compiled_matcher()?;
        let effect_kind = self
            .model
            .required_assertion(SectionKind::Effect, &ctx.e_key)?
            .effect_kind()?;
        let eft_index = p_assertion.tokens.iter().position(|token| token == "eft");

        let eval_ctx = EvalContext {
            functions: &self.fm,
            role_managers: &self.role_managers,
            cache: &self.expr_cache,
        };

        let mut stream = EffectStream::new(effect_kind);
        if p_assertion.policy.is_empty() {
            // Matcher-only models: run once with empty policy fields,
            // the single result counting as an allow row.
            let blanks = vec![String::new(); p_assertion.tokens.len()];
            let mut bindings = Bindings::new();
            bindings.push(&ctx.r_key, &r_assertion.tokens, request);
            bindings.push(&ctx.p_key, &p_assertion.tokens, &blanks);
            let matched = evaluate_bool(&matcher, &eval_ctx, &bindings)?;
            stream.push(Effect::from_row(matched, None));
            let (allowed, _) = stream.conclude();
            debug!(?request, allowed, "decided on empty policy");
            return Ok(EnforceResult {
                allowed,
                explain: Vec::new(),
            });
        }

        for row in &p_assertion.policy {
            if row.len() != p_assertion.tokens.len() {
                return Err(EngineError::MalformedModel {
                    message: format!(
                        "policy row in `{}` has {} fields, section declares {}",
                        ctx.p_key,
                        row.len(),
                        p_assertion.tokens.len()
                    ),
                });
            }
            let mut bindings = Bindings::new();
            bindings.push(&ctx.r_key, &r_assertion.tokens, request);
            bindings.push(&ctx.p_key, &p_assertion.tokens, row);
            let matched = evaluate_bool(&matcher, &eval_ctx, &bindings)?;
            let label = eft_index.and_then(|i| row.get(i)).map(String::as_str);
            if stream.push(Effect::from_row(matched, label)) {
                break;
            }
        }

        let (allowed, explain_index) = stream.conclude();
        let explain = explain_index
            .and_then(|i| p_assertion.policy.get(i))
            .cloned()
            .unwrap_or_default();
        debug!(?request, allowed, ?explain, "decided");
        Ok(EnforceResult { allowed, explain })
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("enabled", &self.enabled)
            .field("auto_build_role_links", &self.auto_build_role_links)
            .field("role_sections", &self.role_managers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
