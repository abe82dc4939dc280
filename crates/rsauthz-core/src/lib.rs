//! rsauthz-core: Authorization decision engine
//!
//! This crate answers "may subject S do action A on object O?" by
//! evaluating a request against a declarative policy model:
//! - INI-style model parsing (request/policy/role/effect/matcher
//!   sections)
//! - A matcher expression language with pattern predicates and
//!   role-graph calls
//! - Role graphs with transitive, optionally domain-scoped inheritance
//! - Effect strategies reducing per-row results to one decision
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rsauthz-core                  │
//! ├─────────────────────────────────────────────┤
//! │  model/     - Model conf parser & rule rows  │
//! │  expr/      - Matcher language & predicates  │
//! │  rbac/      - Role graphs & reachability     │
//! │  effect/    - Decision reduction strategies  │
//! │  enforcer/  - Orchestrator & public APIs     │
//! │  adapter    - Policy source boundary         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod expr;
pub mod model;
pub mod rbac;

// Re-export commonly used types at the crate root
pub use adapter::{Adapter, MemoryAdapter};
pub use enforcer::{EnforceContext, EnforceResult, Enforcer};
pub use error::{EngineError, EngineResult};
pub use expr::{FunctionMap, MatchFn, Value};
pub use model::{Model, SectionKind};
pub use rbac::{DefaultRoleManager, RoleConfig, RoleManager, SharedRoleManager};
