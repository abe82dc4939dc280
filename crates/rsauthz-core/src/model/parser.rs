//! INI-style model text parsing.
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
//! ```
//!
//! `#` starts a comment; section keys may carry a suffix (`r2`, `m2`)
//! to define coexisting alternates.

use crate::error::{EngineError, EngineResult};

use super::{Model, SectionKind};

/// Parses a complete model definition.
pub fn parse_model(text: &str) -> EngineResult<Model> {
    let mut model = Model::new();
    let mut current: Option<SectionKind> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = match raw.find('#') {
            Some(pos) => raw[..pos].trim(),
            None => raw.trim(),
        };
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let name = header.trim();
            current = Some(SectionKind::from_header(name).ok_or_else(|| {
                EngineError::MalformedModel {
                    message: format!("unknown section `[{name}]` at line {line_number}"),
                }
            })?);
            continue;
        }

        let Some(kind) = current else {
            return Err(EngineError::MalformedModel {
                message: format!("definition outside of any section at line {line_number}"),
            });
        };
        let Some((key, value)) = line.split_once('=') else {
            return Err(EngineError::MalformedModel {
                message: format!("expected `key = value` at line {line_number}"),
            });
        };
        model.add_def(kind, key.trim(), value.trim())?;
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
# ACL model
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

    #[test]
    fn parses_a_basic_model() {
        let model = parse_model(BASIC).unwrap();
        let r = model.get_assertion(SectionKind::Request, "r").unwrap();
        assert_eq!(r.tokens, vec!["sub", "obj", "act"]);
        assert!(model.get_assertion(SectionKind::Matcher, "m").is_some());
        assert!(model.get_assertion(SectionKind::Effect, "e").is_some());
    }

    #[test]
    fn parses_named_alternates_and_role_sections() {
        let text = r#"
[request_definition]
r = sub, obj, act
r2 = sub, act

[policy_definition]
p = sub, obj, act
p2 = sub, act

[role_definition]
g = _, _
g2 = _, _, _

[policy_effect]
e = some(where (p.eft == allow))
e2 = priority(p.eft) || deny

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
m2 = r2.sub == p2.sub && r2.act == p2.act
"#;
        let model = parse_model(text).unwrap();
        assert_eq!(
            model.get_assertion(SectionKind::Request, "r2").unwrap().tokens,
            vec!["sub", "act"]
        );
        assert_eq!(model.get_assertion(SectionKind::Role, "g").unwrap().tokens.len(), 2);
        assert_eq!(model.get_assertion(SectionKind::Role, "g2").unwrap().tokens.len(), 3);
        assert!(model.get_assertion(SectionKind::Matcher, "m2").is_some());
    }

    #[test]
    fn rejects_unknown_sections() {
        let err = parse_model("[nonsense]\nx = y").unwrap_err();
        assert!(matches!(err, EngineError::MalformedModel { .. }));
    }

    #[test]
    fn rejects_definitions_outside_sections() {
        let err = parse_model("r = sub, obj, act").unwrap_err();
        assert!(matches!(err, EngineError::MalformedModel { .. }));
    }

    #[test]
    fn strips_trailing_comments() {
        let text = r#"
[request_definition]
r = sub, obj, act  # shape of a request
[policy_definition]
p = sub, obj, act
[policy_effect]
e = some(where (p.eft == allow))
[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;
        let model = parse_model(text).unwrap();
        assert_eq!(
            model.get_assertion(SectionKind::Request, "r").unwrap().tokens,
            vec!["sub", "obj", "act"]
        );
    }
}
