//! substrate - multi-agent code-generation pipeline orchestrator
//!
//! substrate drives a codebase through four phases (analysis, planning,
//! solutioning, implementation) by dispatching prompts to external agent
//! CLIs, persisting every decision, requirement, constraint and artifact
//! to an embedded store, and executing the implementation phase's task
//! graph across isolated git worktrees with bounded concurrency.
//!
//! # Core Concepts
//!
//! - **Append-only decisions**: nothing is deleted, only superseded
//! - **Token-budgeted context**: every phase prompt is assembled from
//!   priority-ordered sections that fit a fixed budget
//! - **Isolated execution**: every implementation task runs in its own
//!   git worktree and is merged, not rebased, onto the session branch
//! - **Observable by construction**: every state change emits onto a
//!   single NDJSON event stream
//!
//! # Modules
//!
//! - [`phase`] - Phase Orchestrator and amendment-context handling
//! - [`graph`] - task graph parsing, validation and execution engine
//! - [`dispatcher`] - sub-agent process dispatch and output parsing
//! - [`gate`] - quality gates and their retry/escalate pipeline
//! - [`pool`] - bounded worker pool
//! - [`worktree`] - git worktree lifecycle
//! - [`context`] - prompt context compiler
//! - [`cost`] - token estimation and rate-table cost accounting
//! - [`events`] - NDJSON event bus
//! - [`signals`] - pause/resume/cancel signal bus
//! - [`recovery`] - crash recovery
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

#![allow(dead_code)]

pub mod cli;
pub mod config;
pub mod context;
pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gate;
pub mod graph;
pub mod phase;
pub mod pool;
pub mod recovery;
pub mod signals;
pub mod worktree;

pub use config::Config;
pub use context::{CompiledContext, Priority as ContextPriority, Section, SectionReport, compile, substitute_placeholders};
pub use cost::{RateTable, check_budget, estimate_cost, estimate_cost_safe, estimate_tokens};
pub use dispatcher::{DispatchRequest, DispatchResult, DispatchStatus, TokenEstimate, dispatch, spawn_and_capture};
pub use error::{CoreError, Result};
pub use events::{DEFAULT_CHANNEL_CAPACITY, Envelope, Event, EventBus, EventEmitter, create_event_bus, run_ndjson_sink, spawn_stdout_sink};
pub use gate::{Action, Evaluation, Evaluator, Gate, GateOutcome, GatePipeline, PipelineIssue, PipelineResult, Severity};
pub use graph::{SessionDef, TaskDef, TaskGraphEngine, TaskGraphFile, TickOutcome, load_into_store, order_ready_set, order_ready_set_by_id};
pub use phase::{Phase, PhaseOrchestrator, PhaseOutcome, PhaseResult, format_phase_completion_summary, validate_phase_range};
pub use pool::{WorkOutcome, WorkRequest, WorkerPool, WorkerState};
pub use recovery::{RecoveryReport, archive_session, find_interrupted_session, recover};
pub use worktree::{ConflictReport, MergeResult, WorktreeConfig, WorktreeError, WorktreeInfo, WorktreeManager};
