//! Policy-source boundary.
//!
//! Adapters move rule rows between a backing store and the model's
//! in-memory sections. The line format is CSV-like: the first column
//! names the section (`p`, `p2`, `g`, ...), the rest are the row
//! fields.
//!
//! ```text
//! p, alice, data1, read
//! p, bob, data2, write
//! g, alice, admin
//! ```

use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::model::{Model, SectionKind};

/// Loads and persists policy rows for a model.
pub trait Adapter: Send + Sync {
    /// Replaces the model's rows with the store's contents.
    fn load_policy(&self, model: &mut Model) -> EngineResult<()>;

    /// Overwrites the store with the model's current rows.
    fn save_policy(&self, model: &Model) -> EngineResult<()>;
}

/// Parses one policy line into the model. Blank lines and `#` comments
/// are skipped; unknown section keys are an `Adapter` error.
pub fn load_policy_line(model: &mut Model, line: &str) -> EngineResult<()> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(());
    }
    let mut fields = line.split(',').map(str::trim);
    let key = fields.next().unwrap_or_default();
    let kind = section_kind_for_key(key).ok_or_else(|| EngineError::Adapter {
        message: format!("unknown policy section key `{key}`"),
    })?;
    let rule: Vec<String> = fields.map(str::to_string).collect();
    model
        .add_policy(kind, key, rule)
        .map_err(|err| EngineError::Adapter {
            message: format!("rejected line `{line}`: {err}"),
        })?;
    Ok(())
}

/// Renders every policy and role row back to line format, sections in
/// key order, rows in stored order.
pub fn serialize_policy(model: &Model) -> String {
    let mut out = String::new();
    for kind in [SectionKind::Policy, SectionKind::Role] {
        let mut keys = model.section_keys(kind);
        keys.sort_unstable();
        for key in keys {
            for row in model.get_policy(kind, &key) {
                out.push_str(&key);
                for field in &row {
                    out.push_str(", ");
                    out.push_str(field);
                }
                out.push('\n');
            }
        }
    }
    out
}

fn section_kind_for_key(key: &str) -> Option<SectionKind> {
    if key.starts_with('p') {
        Some(SectionKind::Policy)
    } else if key.starts_with('g') {
        Some(SectionKind::Role)
    } else {
        None
    }
}

/// Adapter over an in-memory buffer of policy lines. Useful in tests
/// and for hosts that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    lines: RwLock<Vec<String>>,
}

impl MemoryAdapter {
    pub fn new(text: &str) -> Self {
        Self {
            lines: RwLock::new(text.lines().map(str::to_string).collect()),
        }
    }

    /// The buffered lines, as last saved or constructed.
    pub fn lines(&self) -> Vec<String> {
        self.lines.read().clone()
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&self, model: &mut Model) -> EngineResult<()> {
        model.clear_policy();
        for line in self.lines.read().iter() {
            load_policy_line(model, line)?;
        }
        Ok(())
    }

    fn save_policy(&self, model: &Model) -> EngineResult<()> {
        *self.lines.write() = serialize_policy(model)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(())
    }
}
