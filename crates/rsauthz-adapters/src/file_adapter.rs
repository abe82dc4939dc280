//! Policy persistence in a CSV-style text file.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use rsauthz_core::adapter::{load_policy_line, serialize_policy, Adapter};
use rsauthz_core::{EngineError, EngineResult, Model};

/// Adapter over a policy file. The file holds one rule row per line,
/// first column the section key; blank lines and `#` comments are
/// skipped on load.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Adapter for FileAdapter {
    fn load_policy(&self, model: &mut Model) -> EngineResult<()> {
        let file = fs::File::open(&self.path).map_err(|err| EngineError::Adapter {
            message: format!("cannot open {}: {err}", self.path.display()),
        })?;
        model.clear_policy();
        let mut count = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| EngineError::Adapter {
                message: format!("cannot read {}: {err}", self.path.display()),
            })?;
            load_policy_line(model, &line)?;
            count += 1;
        }
        debug!(path = %self.path.display(), lines = count, "loaded policy file");
        Ok(())
    }

    fn save_policy(&self, model: &Model) -> EngineResult<()> {
        let rendered = serialize_policy(model);
        fs::write(&self.path, rendered).map_err(|err| EngineError::Adapter {
            message: format!("cannot write {}: {err}", self.path.display()),
        })?;
        debug!(path = %self.path.display(), "saved policy file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rsauthz_core::SectionKind;

    use super::*;

    const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

    #[test]
    fn loads_rows_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p, alice, data1, read").unwrap();
        writeln!(file, "# members").unwrap();
        writeln!(file, "g, alice, admin").unwrap();

        let mut model: Model = MODEL.parse().unwrap();
        let adapter = FileAdapter::new(file.path());
        adapter.load_policy(&mut model).unwrap();
        assert_eq!(model.get_policy(SectionKind::Policy, "p").len(), 1);
        assert_eq!(model.get_policy(SectionKind::Role, "g").len(), 1);
    }

    #[test]
    fn saves_rows_back_to_the_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut model: Model = MODEL.parse().unwrap();
        model
            .add_policy(
                SectionKind::Policy,
                "p",
                vec!["alice".into(), "data1".into(), "read".into()],
            )
            .unwrap();

        let adapter = FileAdapter::new(file.path());
        adapter.save_policy(&model).unwrap();
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "p, alice, data1, read\n"
        );
    }

    #[test]
    fn missing_files_are_adapter_errors() {
        let mut model: Model = MODEL.parse().unwrap();
        let err = FileAdapter::new("/nonexistent/policy.csv")
            .load_policy(&mut model)
            .unwrap_err();
        assert!(matches!(err, EngineError::Adapter { .. }));
    }

    #[test]
    fn malformed_lines_are_adapter_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q, alice, data1, read").unwrap();
        let mut model: Model = MODEL.parse().unwrap();
        let err = FileAdapter::new(file.path()).load_policy(&mut model).unwrap_err();
        assert!(matches!(err, EngineError::Adapter { .. }));
    }
}
