use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, eyre};
use substrate_engine::cli::{AutoCommand, Cli, Command};
use substrate_engine::events::{EventEmitter, create_event_bus, spawn_stdout_sink};
use substrate_engine::graph::{self, TaskGraphEngine, TickOutcome};
use substrate_engine::phase::amendment::{build_context_block, fit_to_budget};
use substrate_engine::phase::{self, Phase, PhaseOrchestrator, PhaseResult};
use substrate_engine::pool::WorkerPool;
use substrate_engine::worktree::{WorktreeConfig, WorktreeManager};
use substrate_engine::{Config, CoreError, cost, recovery, signals};
use substrate_pack::FilesystemPack;
use substrate_store::Store;
use substrate_store::decision_store::DecisionStore;
use substrate_store::models::{PipelineRun, PipelineRunStatus, Signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_AMENDMENT_BUDGET_TOKENS: u64 = 4_000;
const TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Model used to price phase-level dispatches (analysis/planning/
/// solutioning) for the pipeline-complete cost report. These dispatches
/// aren't tied to a specific model the way task-graph `CostEntry` rows
/// are, so this pins the same default the rate table ships with (§8.4's
/// worked example).
const DEFAULT_PHASE_MODEL: &str = "claude-3-5-sonnet-20241022";

fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = Config::load(cli.config.as_deref()).context("loading config")?;
    let store = Arc::new(Store::open(config.db_path()).context("opening store")?);

    let bus = create_event_bus();
    let sink_handle = cli.ndjson.then(|| spawn_stdout_sink(bus.clone()));

    let result = match cli.command {
        Command::Auto { command } => run_auto(command, &config, store.clone(), &bus).await,
        Command::Pause { session_id } => signals::request(&store, &session_id, Signal::Pause).map_err(eyre_from_core),
        Command::Resume { session_id } => signals::request(&store, &session_id, Signal::Resume).map_err(eyre_from_core),
        Command::Cancel { session_id } => signals::request(&store, &session_id, Signal::Cancel).map_err(eyre_from_core),
        Command::Adapters { health } => run_adapters(health),
    };

    drop(bus);
    if let Some(handle) = sink_handle {
        let _ = handle.await;
    }

    if let Err(e) = &result {
        error!(error = %e, "substrate: command failed");
    }
    result
}

fn eyre_from_core(e: CoreError) -> eyre::Report {
    eyre!(e.actionable_message())
}

fn run_adapters(health: bool) -> eyre::Result<()> {
    if !health {
        println!("Use --health to probe configured agent binaries.");
        return Ok(());
    }
    for agent in ["claude", "codex", "gemini"] {
        let available = std::process::Command::new(agent).arg("--version").output().map(|o| o.status.success()).unwrap_or(false);
        if available {
            println!("  {} {agent}", "ok".green().bold());
        } else {
            println!("  {} {agent}", "unavailable".red().bold());
        }
    }
    Ok(())
}

async fn run_auto(command: AutoCommand, config: &Config, store: Arc<Store>, bus: &Arc<substrate_engine::EventBus>) -> eyre::Result<()> {
    match command {
        AutoCommand::Run { pack, agent, from, stop_after, session_budget, concurrency, task_graph, parent_run_id, concept } => {
            let from = Phase::parse(&from).map_err(eyre_from_core)?;
            let stop_after = stop_after.as_deref().map(Phase::parse).transpose().map_err(eyre_from_core)?;
            phase::validate_phase_range(from, stop_after).map_err(eyre_from_core)?;

            let pack = Arc::new(FilesystemPack::open(pack)?);
            let ds = DecisionStore::new(&store);

            let mut run = PipelineRun::new("substrate");
            if let Some(parent_run_id) = &parent_run_id {
                run = run.with_parent(parent_run_id.clone());
            }
            let run = ds.create_pipeline_run(run).map_err(CoreError::Store).map_err(eyre_from_core)?;

            let amendment_prefix = match &parent_run_id {
                Some(parent_run_id) => {
                    let decisions = ds.load_parent_run_decisions(parent_run_id).map_err(CoreError::Store).map_err(eyre_from_core)?;
                    let block = build_context_block(&decisions, concept.as_deref());
                    fit_to_budget(&block, DEFAULT_AMENDMENT_BUDGET_TOKENS)
                }
                None => None,
            };

            let events = bus.emitter_for(run.id.clone());
            let phase_names: Vec<String> = phase::PHASE_ORDER.iter().map(|p| p.to_string()).collect();
            events.pipeline_start(&run.id, &run.methodology, &phase_names);

            drive_phases(
                &store,
                pack,
                events,
                config,
                &run.id,
                from,
                stop_after,
                amendment_prefix.as_deref(),
                &agent,
                session_budget,
                concurrency,
                task_graph.as_deref(),
            )
            .await
        }
        AutoCommand::Resume { run_id, stop_after, task_graph } => {
            let run = store.get_required::<PipelineRun>(&run_id).map_err(CoreError::Store).map_err(eyre_from_core)?;
            let from = match &run.current_phase {
                Some(phase) => Phase::parse(phase).map_err(eyre_from_core)?.next().unwrap_or(Phase::Implementation),
                None => Phase::Analysis,
            };
            let stop_after = stop_after.as_deref().map(Phase::parse).transpose().map_err(eyre_from_core)?;
            phase::validate_phase_range(from, stop_after).map_err(eyre_from_core)?;

            let pack = Arc::new(FilesystemPack::open(config.pack_path.clone())?);
            let events = bus.emitter_for(run.id.clone());

            drive_phases(&store, pack, events, config, &run.id, from, stop_after, None, "claude", None, config.max_concurrency, task_graph.as_deref()).await
        }
        AutoCommand::Status { run_id } => {
            let run = store.get_required::<PipelineRun>(&run_id).map_err(CoreError::Store).map_err(eyre_from_core)?;
            println!("run {} status={} phase={}", run.id, run.status, run.current_phase.as_deref().unwrap_or("none"));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_phases(
    store: &Arc<Store>,
    pack: Arc<FilesystemPack>,
    events: EventEmitter,
    config: &Config,
    run_id: &str,
    from: Phase,
    stop_after: Option<Phase>,
    amendment_prefix: Option<&str>,
    agent: &str,
    session_budget: Option<f64>,
    concurrency: usize,
    task_graph: Option<&Path>,
) -> eyre::Result<()> {
    let orchestrator = PhaseOrchestrator::new(store.clone(), pack, events.clone());
    let ds = DecisionStore::new(store);
    let rates = cost::RateTable::with_defaults();
    let mut implementation_session_id: Option<String> = None;
    let mut total_input_tokens: u64 = 0;
    let mut total_output_tokens: u64 = 0;

    let mut current = Some(from);
    let mut amendment_prefix = amendment_prefix.map(str::to_string);
    while let Some(phase) = current {
        if phase == Phase::Implementation {
            let session_id =
                run_implementation_phase(store, &orchestrator, &events, config, run_id, agent, session_budget, concurrency, task_graph).await?;
            implementation_session_id = Some(session_id);
            break;
        }

        let started = std::time::Instant::now();
        let outcome = orchestrator.run_phase(run_id, phase, agent, amendment_prefix.as_deref()).await.map_err(eyre_from_core)?;
        amendment_prefix = None;

        if outcome.result == PhaseResult::Failed {
            orchestrator.mark_run_status(run_id, PipelineRunStatus::Failed).map_err(eyre_from_core)?;
            return Err(eyre!("phase '{phase}' failed"));
        }

        total_input_tokens += outcome.input_tokens;
        total_output_tokens += outcome.output_tokens;
        ds.add_token_usage(run_id, phase.as_str(), outcome.input_tokens as i64, outcome.output_tokens as i64)
            .map_err(CoreError::Store)
            .map_err(eyre_from_core)?;

        let summary = phase::format_phase_completion_summary(
            run_id,
            phase,
            started.elapsed().as_millis() as u64,
            outcome.decisions_created,
            &outcome.artifact_paths,
            "substrate",
        );
        println!("{}", summary.green());

        if stop_after == Some(phase) {
            orchestrator.mark_run_status(run_id, PipelineRunStatus::Stopped).map_err(eyre_from_core)?;
            return Ok(());
        }

        current = phase.next();
    }

    orchestrator.mark_run_status(run_id, PipelineRunStatus::Completed).map_err(eyre_from_core)?;

    let phase_cost = cost::estimate_cost_safe(&rates, agent, DEFAULT_PHASE_MODEL, total_input_tokens, total_output_tokens);
    let implementation_cost = match &implementation_session_id {
        Some(session_id) => substrate_store::views::session_cost_summary(store, session_id).map_err(CoreError::Store).map_err(eyre_from_core)?.total_cost_usd,
        None => 0.0,
    };
    events.pipeline_complete(run_id, "completed", phase_cost + implementation_cost);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_implementation_phase(
    store: &Arc<Store>,
    orchestrator: &PhaseOrchestrator,
    events: &EventEmitter,
    config: &Config,
    run_id: &str,
    _agent: &str,
    session_budget: Option<f64>,
    concurrency: usize,
    task_graph: Option<&Path>,
) -> eyre::Result<String> {
    let task_graph = task_graph.ok_or_else(|| eyre!("--task-graph is required once the implementation phase runs"))?;
    let graph = graph::file_format::parse_graph_file(task_graph).map_err(eyre_from_core)?;
    graph::validate::validate_no_cycles(&graph).map_err(eyre_from_core)?;
    graph::validate::validate_no_dangling_references(&graph).map_err(eyre_from_core)?;

    let worktree = Arc::new(WorktreeManager::new(WorktreeConfig {
        base_dir: config.worktree_base_dir(),
        repo_root: config.project_root.clone(),
        min_disk_space_gb: config.min_disk_space_gb,
        branch_prefix: config.branch_prefix.clone(),
        default_base_branch: config.base_branch.clone(),
    }));

    let recovery_report = recovery::recover(store, &worktree).await.map_err(eyre_from_core)?;
    info!(recovered = recovery_report.recovered, failed = recovery_report.failed, "startup recovery complete");

    let session = graph::load_into_store(store, &graph, &config.base_branch).map_err(eyre_from_core)?;
    let (pool, mut outcomes) = WorkerPool::new(concurrency);
    let pool = Arc::new(pool);
    let rates = cost::RateTable::with_defaults();
    let engine = TaskGraphEngine::new(Arc::clone(store), pool, worktree, rates);

    loop {
        signals::poll_and_apply(store, &session.id).map_err(eyre_from_core)?;
        match engine.tick(&session.id, session_budget).await.map_err(eyre_from_core)? {
            TickOutcome::Finished => break,
            TickOutcome::Halted => {
                events.story_stall("implementation", "session paused or cancelled");
                break;
            }
            TickOutcome::InProgress => {
                engine.collect_outcomes(&mut outcomes).await.map_err(eyre_from_core)?;
                events.pipeline_heartbeat(run_id);
                tokio::time::sleep(TICK_INTERVAL).await;
            }
        }
    }

    orchestrator.mark_run_status(run_id, PipelineRunStatus::Completed).map_err(eyre_from_core)?;
    Ok(session.id)
}
