//! Effect strategies: reducing per-row matcher results to one decision.
//!
//! The model's effect expression selects a strategy at load time;
//! evaluation streams `(matched, label)` results through an
//! `EffectStream`, which short-circuits as early as its strategy allows
//! and remembers which row determined the outcome.

/// Per-row contribution after matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    /// The row did not match (or carried an unrecognized label).
    Indeterminate,
    Deny,
}

impl Effect {
    /// Combines the matcher result with the row's optional `eft` label.
    /// An absent or empty label means allow; anything but `allow`/`deny`
    /// is ignored as indeterminate.
    pub fn from_row(matched: bool, label: Option<&str>) -> Effect {
        if !matched {
            return Effect::Indeterminate;
        }
        match label.map(str::trim) {
            None | Some("") | Some("allow") => Effect::Allow,
            Some("deny") => Effect::Deny,
            Some(_) => Effect::Indeterminate,
        }
    }
}

/// A supported reduction strategy, parsed from the effect expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// `some(where (p.eft == allow))`: true if any row matched.
    AllowOverride,
    /// `!some(where (p.eft == deny))`: true unless a matching row denies.
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`.
    AllowAndDeny,
    /// `priority(p.eft) || deny`: first matching row wins by its label.
    Priority,
}

impl EffectKind {
    /// Maps an effect expression to its strategy. Whitespace is not
    /// significant. Unknown expressions are rejected here, at model-load
    /// time, never at evaluation time.
    pub fn parse(expression: &str) -> Option<EffectKind> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "some(where(p.eft==allow))" => Some(EffectKind::AllowOverride),
            "!some(where(p.eft==deny))" => Some(EffectKind::DenyOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => {
                Some(EffectKind::AllowAndDeny)
            }
            "priority(p.eft)||deny" => Some(EffectKind::Priority),
            _ => None,
        }
    }
}

/// Push-based reduction over the ordered per-row results.
#[derive(Debug)]
pub struct EffectStream {
    kind: EffectKind,
    decision: Option<bool>,
    explain: Option<usize>,
    first_allow: Option<usize>,
    idx: usize,
}

impl EffectStream {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            decision: None,
            explain: None,
            first_allow: None,
            idx: 0,
        }
    }

    /// Feeds the next row's effect. Returns true once the decision is
    /// final and the caller may stop scanning rows.
    pub fn push(&mut self, effect: Effect) -> bool {
        let idx = self.idx;
        self.idx += 1;
        match self.kind {
            EffectKind::AllowOverride => {
                // Any match decides; labels are not consulted.
                if effect != Effect::Indeterminate {
                    self.decision = Some(true);
                    self.explain = Some(idx);
                    return true;
                }
            }
            EffectKind::DenyOverride => {
                if effect == Effect::Deny {
                    self.decision = Some(false);
                    self.explain = Some(idx);
                    return true;
                }
            }
            EffectKind::AllowAndDeny => match effect {
                // A deny can override any earlier allow, so a seen allow
                // never ends the scan early.
                Effect::Deny => {
                    self.decision = Some(false);
                    self.explain = Some(idx);
                    return true;
                }
                Effect::Allow => {
                    if self.first_allow.is_none() {
                        self.first_allow = Some(idx);
                    }
                }
                Effect::Indeterminate => {}
            },
            EffectKind::Priority => match effect {
                Effect::Allow => {
                    self.decision = Some(true);
                    self.explain = Some(idx);
                    return true;
                }
                Effect::Deny => {
                    self.decision = Some(false);
                    self.explain = Some(idx);
                    return true;
                }
                Effect::Indeterminate => {}
            },
        }
        false
    }

    /// Final decision and the index of the row that determined it, if
    /// one did.
    pub fn conclude(self) -> (bool, Option<usize>) {
        if let Some(decision) = self.decision {
            return (decision, self.explain);
        }
        match self.kind {
            EffectKind::DenyOverride => (true, None),
            EffectKind::AllowAndDeny => match self.first_allow {
                Some(idx) => (true, Some(idx)),
                None => (false, None),
            },
            EffectKind::AllowOverride | EffectKind::Priority => (false, None),
        }
    }
}
