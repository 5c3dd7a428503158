use std::path::{Path, PathBuf};

use tracing::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};
use crate::pack::MethodologyPack;
use crate::types::{ConstraintRule, PhaseDescriptor};

/// `<packRoot>/manifest.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    phases: Vec<PhaseDescriptor>,
}

/// A filesystem-backed [`MethodologyPack`]: `<root>/manifest.yaml` declares
/// the phase sequence; `<root>/prompts/<taskType>.md`,
/// `<root>/constraints/<phase>.yaml`, and `<root>/templates/<name>.md`
/// supply the rest. This layout is illustrative (§4.C leaves pack layout to
/// an external collaborator) but mirrors the directory-of-assets shape the
/// rest of the workspace uses for its own file-backed context store.
pub struct FilesystemPack {
    root: PathBuf,
    manifest: Manifest,
}

impl FilesystemPack {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest_path = root.join("manifest.yaml");
        debug!(?manifest_path, "FilesystemPack::open: loading manifest");
        if !manifest_path.exists() {
            return Err(PackError::ManifestNotFound(manifest_path));
        }
        let text = std::fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = serde_yaml::from_str(&text)?;
        Ok(Self { root, manifest })
    }

    fn read_text(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.root.join(relative);
        Ok(std::fs::read_to_string(path)?)
    }
}

impl MethodologyPack for FilesystemPack {
    fn get_phases(&self) -> Result<Vec<PhaseDescriptor>> {
        let mut phases = self.manifest.phases.clone();
        phases.sort_by_key(|p| p.order);
        Ok(phases)
    }

    fn get_prompt(&self, task_type: &str) -> Result<String> {
        self.read_text(format!("prompts/{task_type}.md"))
            .map_err(|_| PackError::UnknownTaskType(task_type.to_string()))
    }

    fn get_constraints(&self, phase: &str) -> Result<Vec<ConstraintRule>> {
        let path = self.root.join(format!("constraints/{phase}.yaml"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    fn get_template(&self, name: &str) -> Result<String> {
        self.read_text(format!("templates/{name}.md"))
            .map_err(|_| PackError::UnknownTemplate(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_phases_prompts_constraints_templates() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "manifest.yaml",
            "phases:\n  - name: planning\n    order: 2\n  - name: analysis\n    order: 1\n",
        );
        write(dir.path(), "prompts/dev-story.md", "Implement {{story}}");
        write(
            dir.path(),
            "constraints/planning.yaml",
            "- rule_id: no-todos\n  severity: warn\n  description: no stray TODOs\n",
        );
        write(dir.path(), "templates/summary.md", "{{count}} decisions made");

        let pack = FilesystemPack::open(dir.path()).unwrap();
        let phases = pack.get_phases().unwrap();
        assert_eq!(phases[0].name, "analysis");
        assert_eq!(phases[1].name, "planning");

        assert_eq!(pack.get_prompt("dev-story").unwrap(), "Implement {{story}}");
        assert!(pack.get_prompt("missing").is_err());

        let constraints = pack.get_constraints("planning").unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].rule_id, "no-todos");

        assert!(pack.get_constraints("solutioning").unwrap().is_empty());
        assert_eq!(pack.get_template("summary").unwrap(), "{{count}} decisions made");
    }
}
