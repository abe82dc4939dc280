//! Compiled-expression cache.
//!
//! `eval(p.field)` rules carry their condition text in the policy row, so
//! the same sub-expression is compiled once and reused across rows and
//! requests. Keyed by source string; cloning entries is an `Arc` bump.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::EngineResult;

use super::ast::Expr;
use super::parser;

/// Thread-safe cache of compiled expressions keyed by source text.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    cache: DashMap<String, Arc<Expr>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached compilation of `source`, compiling and caching
    /// it on first sight. Compilation failures are not cached.
    pub fn get_or_compile(&self, source: &str) -> EngineResult<Arc<Expr>> {
        if let Some(cached) = self.cache.get(source) {
            return Ok(Arc::clone(cached.value()));
        }

        // Entry API keeps compile-and-insert atomic so concurrent callers
        // observe a single Arc per source string.
        use dashmap::mapref::entry::Entry;
        match self.cache.entry(source.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let compiled = Arc::new(parser::parse(source)?);
                entry.insert(Arc::clone(&compiled));
                Ok(compiled)
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached expression. Called when policy rows carrying
    /// sub-rules may have changed wholesale.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}
