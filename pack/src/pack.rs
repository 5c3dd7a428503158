use crate::error::Result;
use crate::types::{ConstraintRule, PhaseDescriptor};

/// Read-only provider of phase prompts, constraint rules, and templates,
/// keyed by task type (§4.C). The core depends only on this interface; file
/// layout and packaging are an external collaborator's concern.
pub trait MethodologyPack {
    fn get_phases(&self) -> Result<Vec<PhaseDescriptor>>;

    /// Template text for a sub-agent dispatch of the given task type.
    fn get_prompt(&self, task_type: &str) -> Result<String>;

    fn get_constraints(&self, phase: &str) -> Result<Vec<ConstraintRule>>;

    /// Template text for a named template (used by the Context Compiler's
    /// section `format` callbacks and by phase-completion summaries).
    fn get_template(&self, name: &str) -> Result<String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn MethodologyPack) {}
};
