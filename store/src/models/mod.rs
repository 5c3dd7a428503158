mod artifact;
mod constraint;
mod cost_entry;
mod decision;
mod pipeline_run;
mod requirement;
mod session;
mod session_signal;
mod task;
mod task_dependency;

pub use artifact::Artifact;
pub use constraint::{Constraint, ConstraintSeverity};
pub use cost_entry::CostEntry;
pub use decision::Decision;
pub use pipeline_run::{PipelineRun, PipelineRunStatus};
pub use requirement::{Requirement, RequirementKind};
pub use session::{Session, SessionStatus};
pub use session_signal::{SessionSignal, Signal};
pub use task::{BillingMode, Task, TaskStatus};
