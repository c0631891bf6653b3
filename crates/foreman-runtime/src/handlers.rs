use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use foreman_types::{
    AgentEvent, AgentStatus, ArtifactEvent, CheckpointReason, CompletionOutcome, EventEnvelope,
    LifecycleAction, Severity, ToolCategory, TrustOutcome,
};

use foreman_engine::SubscriptionFilter;

use crate::classify::classify;
use crate::coordinator::Services;
use crate::outbound::OutboundMessage;
use crate::plugin::KillOptions;

/// Install the fixed subscriber set. Called exactly once, at coordinator
/// construction; the wiring is dependency-injected here, never global.
pub(crate) fn install(services: &Arc<Services>) {
    install_all_events(services);
    install_decision(services);
    install_artifact(services);
    install_lifecycle(services);
    install_completion(services);
    install_error(services);
    install_tick(services);
}

/// All events: track the agent, append to the knowledge store, classify
/// and fan out to clients.
fn install_all_events(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services.bus.subscribe(SubscriptionFilter::all(), move |envelope| {
        if !envelope.is_synthetic() {
            track_agent(&ctx, envelope.agent_id());
        }
        ctx.store.lock().unwrap().append_event(envelope)?;
        forward_to_clients(&ctx, envelope);
        Ok(())
    });
}

fn install_decision(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services
        .bus
        .subscribe(SubscriptionFilter::event_type("decision"), move |envelope| {
            let AgentEvent::Decision(decision) = &envelope.event else {
                return Ok(());
            };
            let tick = ctx.ticks.current_tick();
            ctx.queue.enqueue(decision.clone(), tick);

            set_agent_status(&ctx, &decision.agent_id, AgentStatus::WaitingOnHuman);

            // Best-effort: a checkpoint taken while the agent blocks makes
            // the decision recoverable after a crash
            request_checkpoint_background(
                &ctx,
                &decision.agent_id,
                CheckpointReason::DecisionCheckpoint,
                Some(decision.decision_id().to_string()),
            );
            Ok(())
        });
}

fn install_artifact(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services
        .bus
        .subscribe(SubscriptionFilter::event_type("artifact"), move |envelope| {
            let AgentEvent::Artifact(artifact) = &envelope.event else {
                return Ok(());
            };
            ctx.store.lock().unwrap().store_artifact(artifact)?;

            if let Some(issue) = ctx.coherence.process_artifact(artifact) {
                emit_issue(&ctx, issue);
            }

            let tick = ctx.ticks.current_tick();
            run_coherence_pipeline(&ctx, tick);
            Ok(())
        });
}

fn install_lifecycle(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services
        .bus
        .subscribe(SubscriptionFilter::event_type("lifecycle"), move |envelope| {
            let AgentEvent::Lifecycle(lifecycle) = &envelope.event else {
                return Ok(());
            };
            let agent_id = lifecycle.agent_id.as_str();
            match lifecycle.action {
                LifecycleAction::Started => {
                    set_agent_status(&ctx, agent_id, AgentStatus::Running);
                }
                LifecycleAction::Paused => {
                    set_agent_status(&ctx, agent_id, AgentStatus::Paused);
                }
                LifecycleAction::Resumed => {
                    set_agent_status(&ctx, agent_id, AgentStatus::Running);
                }
                LifecycleAction::Killed | LifecycleAction::Crashed => {
                    info!(agent_id, action = ?lifecycle.action, "agent record removed");
                    ctx.registry.remove(agent_id);
                    ctx.idle_since.lock().unwrap().remove(agent_id);
                    let mut store = ctx.store.lock().unwrap();
                    store.remove_agent(agent_id)?;
                    store.append_audit_log(
                        "lifecycle",
                        agent_id,
                        action_name(lifecycle.action),
                        agent_id,
                        None,
                    )?;
                }
                LifecycleAction::SessionStart | LifecycleAction::SessionEnd => {
                    ctx.store.lock().unwrap().append_audit_log(
                        "lifecycle",
                        agent_id,
                        action_name(lifecycle.action),
                        agent_id,
                        None,
                    )?;
                }
            }
            Ok(())
        });
}

fn install_completion(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services
        .bus
        .subscribe(SubscriptionFilter::event_type("completion"), move |envelope| {
            let AgentEvent::Completion(completion) = &envelope.event else {
                return Ok(());
            };
            let agent_id = completion.agent_id.as_str();
            let tick = ctx.ticks.current_tick();

            let outcome = match completion.outcome {
                CompletionOutcome::Success => TrustOutcome::TaskCompletedClean,
                CompletionOutcome::Partial => TrustOutcome::TaskCompletedPartial,
                CompletionOutcome::Abandoned | CompletionOutcome::MaxTurns => {
                    TrustOutcome::TaskAbandonedOrMaxTurns
                }
            };
            if let Some(change) =
                ctx.trust
                    .apply_outcome(agent_id, outcome, tick, completion_context(completion))
            {
                let _ = ctx.outbound.send(OutboundMessage::TrustUpdate { change });
            }

            match completion.outcome {
                CompletionOutcome::Success | CompletionOutcome::Partial => {
                    set_agent_status(&ctx, agent_id, AgentStatus::Idle);
                    ctx.idle_since.lock().unwrap().insert(agent_id.to_string(), tick);
                    request_checkpoint_background(
                        &ctx,
                        agent_id,
                        CheckpointReason::IdleCompletion,
                        None,
                    );
                }
                CompletionOutcome::Abandoned | CompletionOutcome::MaxTurns => {
                    set_agent_status(&ctx, agent_id, AgentStatus::Completed);
                    ctx.idle_since.lock().unwrap().remove(agent_id);
                }
            }
            Ok(())
        });
}

fn install_error(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services
        .bus
        .subscribe(SubscriptionFilter::event_type("error"), move |envelope| {
            let AgentEvent::Error(error) = &envelope.event else {
                return Ok(());
            };
            if error.severity == Severity::Warning {
                return Ok(());
            }

            let tool_category = error
                .context
                .as_ref()
                .and_then(|c| c.tool_name.as_deref())
                .map(ToolCategory::classify);
            let context = foreman_engine::OutcomeContext {
                tool_category,
                ..Default::default()
            };
            let tick = ctx.ticks.current_tick();
            if let Some(change) =
                ctx.trust
                    .apply_outcome(&error.agent_id, TrustOutcome::ErrorEvent, tick, context)
            {
                let _ = ctx.outbound.send(OutboundMessage::TrustUpdate { change });
            }
            Ok(())
        });
}

/// Tick: coherence pipeline for the system run, then the idle sweep
fn install_tick(services: &Arc<Services>) {
    let ctx = Arc::clone(services);
    services.ticks.on_tick(move |tick| {
        run_coherence_pipeline(&ctx, tick);
        sweep_idle_agents(&ctx, tick);
        Ok(())
    });
}

fn track_agent(ctx: &Arc<Services>, agent_id: &str) {
    if agent_id.is_empty() || ctx.registry.get(agent_id).is_some() {
        return;
    }
    let handle = ctx.registry.ensure(agent_id);
    ctx.trust.register_agent(agent_id, 0.0);
    if let Err(err) = ctx.store.lock().unwrap().register_agent(&handle, None) {
        warn!(agent_id, error = %err, "agent registration write failed");
    }
}

fn set_agent_status(ctx: &Arc<Services>, agent_id: &str, status: AgentStatus) {
    ctx.registry.ensure(agent_id);
    ctx.registry.set_status(agent_id, status);
    if let Err(err) = ctx.store.lock().unwrap().update_agent_status(agent_id, status) {
        warn!(agent_id, error = %err, "status write failed");
    }
}

fn forward_to_clients(ctx: &Arc<Services>, envelope: &EventEnvelope) {
    let classified = classify(&envelope.event);
    // No receivers is normal before the first client connects
    let _ = ctx.outbound.send(OutboundMessage::Event {
        workspace: classified.workspace,
        secondary_workspaces: classified.secondary_workspaces,
        envelope: envelope.clone(),
    });
}

/// Store the issue and re-enter the fan-out path with a synthetic
/// envelope. The bus dedup window keys on `coherence-<issueId>`, so a
/// re-detected conflict broadcasts once.
pub(crate) fn emit_issue(ctx: &Arc<Services>, issue: foreman_types::CoherenceEvent) {
    if let Err(err) = ctx.store.lock().unwrap().store_coherence_issue(&issue) {
        warn!(issue_id = %issue.issue_id, error = %err, "coherence issue write failed");
    }
    let envelope = EventEnvelope::synthetic(issue);
    ctx.bus.publish(&envelope);
}

/// Layered scans, collapsed to one active run by the in-flight flag
pub(crate) fn run_coherence_pipeline(ctx: &Arc<Services>, tick: u64) {
    if ctx.pipeline_running.swap(true, Ordering::SeqCst) {
        debug!(tick, "coherence pipeline already running; skipping");
        return;
    }

    let mut fresh = Vec::new();

    if ctx.coherence.should_run_layer1_scan(tick) {
        let store = ctx.store.lock().unwrap();
        fresh.extend(ctx.coherence.run_layer1_scan(tick, &|artifact_id| {
            store
                .get_artifact(artifact_id)
                .ok()
                .flatten()
                .map(|record| record.event)
        }));
    }

    let needs_sweep = ctx.coherence.should_run_layer1c_sweep(tick);
    let needs_review = ctx.coherence.config().enable_layer2;
    if needs_sweep || needs_review {
        let store = ctx.store.lock().unwrap();
        let artifacts: Vec<ArtifactEvent> = match store.list_artifacts() {
            Ok(grouped) => grouped
                .into_iter()
                .flat_map(|g| g.artifacts.into_iter().map(|a| a.event))
                .collect(),
            Err(err) => {
                warn!(error = %err, "artifact listing failed; pipeline skipped");
                Vec::new()
            }
        };

        if needs_sweep {
            fresh.extend(ctx.coherence.run_layer1c_sweep(
                tick,
                &artifacts,
                &|agent_id, artifact_id| {
                    store
                        .get_artifact_content(agent_id, artifact_id)
                        .ok()
                        .flatten()
                        .map(|c| c.content)
                },
            ));
        }
        if needs_review {
            fresh.extend(ctx.coherence.run_layer2_review(&artifacts, ctx.review.as_ref()));
        }
    }

    for issue in fresh {
        emit_issue(ctx, issue);
    }

    ctx.pipeline_running.store(false, Ordering::SeqCst);
}

/// Agents idle past the configured window are auto-killed, best-effort
fn sweep_idle_agents(ctx: &Arc<Services>, tick: u64) {
    let timeout = ctx.config.agents.idle_timeout_ticks;
    let expired: Vec<String> = {
        let idle = ctx.idle_since.lock().unwrap();
        idle.iter()
            .filter(|(_, since)| tick.saturating_sub(**since) >= timeout)
            .map(|(agent_id, _)| agent_id.clone())
            .collect()
    };

    for agent_id in expired {
        info!(agent_id = %agent_id, tick, "idle timeout; auto-killing agent");
        ctx.idle_since.lock().unwrap().remove(&agent_id);

        if let Some(handle) = ctx.registry.remove(&agent_id) {
            if let Err(err) = ctx.store.lock().unwrap().remove_agent(&agent_id) {
                warn!(agent_id = %agent_id, error = %err, "agent removal write failed");
            }
            if let Some(plugin) = ctx.plugins.get(&handle.plugin_name) {
                let plugin = Arc::clone(plugin);
                spawn_background(async move {
                    let options = KillOptions {
                        grace: true,
                        grace_timeout_ms: None,
                    };
                    if let Err(err) = plugin.kill(&handle, options).await {
                        warn!(agent_id = %handle.id, error = %err, "idle auto-kill failed");
                    }
                });
            }
        }
    }
}

/// Checkpoint requests must not suspend the publish path: they run as
/// background tasks and their failures are logged, never surfaced.
fn request_checkpoint_background(
    ctx: &Arc<Services>,
    agent_id: &str,
    reason: CheckpointReason,
    decision_id: Option<String>,
) {
    let Some(handle) = ctx.registry.get(agent_id) else {
        return;
    };
    let Some(plugin) = ctx.plugins.get(&handle.plugin_name) else {
        debug!(agent_id, plugin = %handle.plugin_name, "no plugin; checkpoint skipped");
        return;
    };
    let plugin = Arc::clone(plugin);
    let ctx = Arc::clone(ctx);
    spawn_background(async move {
        match plugin
            .request_checkpoint(&handle, decision_id.as_deref())
            .await
        {
            Ok(state) => {
                let state = state.retagged(reason);
                ctx.checkpoints.lock().unwrap().store_checkpoint(
                    state,
                    decision_id,
                    ctx.config.checkpoints.max_per_agent,
                );
            }
            Err(err) => {
                warn!(agent_id = %handle.id, error = %err, "checkpoint request failed");
            }
        }
    });
}

fn spawn_background<F>(future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => warn!("no async runtime; background task skipped"),
    }
}

/// Trust attribution derived from the completion report: the union of
/// artifact kinds and workstreams the agent actually produced
fn completion_context(completion: &foreman_types::CompletionEvent) -> foreman_engine::OutcomeContext {
    let mut kinds: Vec<foreman_types::ArtifactKind> = completion
        .artifacts_produced
        .iter()
        .map(|a| a.kind)
        .collect();
    kinds.sort_by_key(|k| *k as u8);
    kinds.dedup();

    let mut workstreams: Vec<String> = completion
        .artifacts_produced
        .iter()
        .map(|a| a.workstream.clone())
        .collect();
    workstreams.sort_unstable();
    workstreams.dedup();

    foreman_engine::OutcomeContext {
        artifact_kinds: (!kinds.is_empty()).then_some(kinds),
        workstreams: (!workstreams.is_empty()).then_some(workstreams),
        tool_category: None,
    }
}

fn action_name(action: LifecycleAction) -> &'static str {
    match action {
        LifecycleAction::Started => "started",
        LifecycleAction::Paused => "paused",
        LifecycleAction::Resumed => "resumed",
        LifecycleAction::Killed => "killed",
        LifecycleAction::Crashed => "crashed",
        LifecycleAction::SessionStart => "session_start",
        LifecycleAction::SessionEnd => "session_end",
    }
}
