//! The top-level agent loop.
//!
//! `run` drives the orchestrator one step at a time until the model
//! finishes, a step stops the run, or the turn budget runs out. State is
//! saved after every step, before the termination check.

use chrono::Utc;
use ponder_config::PonderConfig;
use ponder_core::error::StateError;
use ponder_core::event::{AgentEvent, EventSink, NoopEventSink};
use ponder_core::llm::LlmClient;
use ponder_core::metrics::{MetricsCollector, NoopMetrics};
use ponder_core::state::{AgentState, StateStore};
use ponder_core::tool::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use crate::loop_detector::LoopDetector;
use crate::orchestrator::{AgentStepResult, Orchestrator};
use crate::parser::ParserLimits;
use crate::reasoning::ReasoningManager;
use crate::tool_executor::ToolExecutor;

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub succeeded: bool,
    pub final_output: Option<String>,
    pub error: Option<String>,
    /// Turns recorded in the agent's state when the run ended.
    pub turns: usize,
}

pub struct AgentBuilder {
    client: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    store: Arc<dyn StateStore>,
    config: PonderConfig,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsCollector>,
    agent_id: Option<String>,
}

impl AgentBuilder {
    pub fn config(mut self, config: PonderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Agent id used for state and events. Defaults to a fresh UUID.
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn build(self) -> Agent {
        let config = self.config;

        let communicator = Arc::new(
            LlmCommunicator::new(self.client, Duration::from_secs(config.llm.timeout_secs))
                .with_temperature(config.llm.temperature)
                .with_max_tokens(config.llm.max_tokens)
                .with_limits(ParserLimits::from(&config.parser))
                .with_events(self.events.clone())
                .with_metrics(self.metrics.clone()),
        );
        let executor = ToolExecutor::new(Duration::from_secs(config.tools.timeout_secs))
            .with_events(self.events.clone())
            .with_metrics(self.metrics.clone());
        let reasoning = ReasoningManager::new(communicator.clone(), &config.reasoning)
            .with_events(self.events.clone());
        let orchestrator = Orchestrator::new(
            communicator,
            executor,
            LoopDetector::from_config(&config.loop_detection),
            reasoning,
            &config.agent,
        )
        .with_events(self.events.clone());

        Agent {
            agent_id: self.agent_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            tools: self.tools,
            store: self.store,
            orchestrator,
            max_turns: config.agent.max_turns.max(1),
            events: self.events,
            metrics: self.metrics,
        }
    }
}

pub struct Agent {
    agent_id: String,
    tools: ToolRegistry,
    store: Arc<dyn StateStore>,
    orchestrator: Orchestrator,
    max_turns: usize,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsCollector>,
}

impl Agent {
    pub fn builder(client: Arc<dyn LlmClient>, tools: ToolRegistry, store: Arc<dyn StateStore>) -> AgentBuilder {
        AgentBuilder {
            client,
            tools,
            store,
            config: PonderConfig::default(),
            events: Arc::new(NoopEventSink),
            metrics: Arc::new(NoopMetrics),
            agent_id: None,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Run toward `goal` until finished, stopped or out of turns.
    ///
    /// Returns `Err` only for cancellation and state-store failures; every
    /// other ending is an [`AgentResult`].
    pub async fn run(&self, goal: &str, cancel: &CancellationToken) -> Result<AgentResult, AgentError> {
        let started = Instant::now();
        let mut state = self.load_or_create(goal).await?;

        info!(
            agent_id = %self.agent_id,
            goal = %state.goal,
            resumed_turns = state.turns.len(),
            max_turns = self.max_turns,
            "Agent run starting"
        );
        self.events.publish(AgentEvent::RunStarted {
            agent_id: self.agent_id.clone(),
            goal: state.goal.clone(),
            timestamp: Utc::now(),
        });

        let outcome = self.drive(&mut state, cancel).await;

        let (succeeded, error) = match &outcome {
            Ok(result) => (result.succeeded, result.error.clone()),
            Err(e) => (false, Some(e.to_string())),
        };
        let elapsed = started.elapsed();
        self.metrics
            .record_run(&self.agent_id, state.turns.len(), succeeded, elapsed);
        self.events.publish(AgentEvent::RunCompleted {
            agent_id: self.agent_id.clone(),
            succeeded,
            turns: state.turns.len(),
            error: error.clone(),
            timestamp: Utc::now(),
        });

        if succeeded {
            info!(
                agent_id = %self.agent_id,
                turns = state.turns.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Agent run succeeded"
            );
        } else {
            warn!(
                agent_id = %self.agent_id,
                turns = state.turns.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = error.as_deref().unwrap_or_default(),
                "Agent run failed"
            );
        }
        outcome
    }

    /// Execute a single step on the stored state.
    pub async fn step(&self, cancel: &CancellationToken) -> Result<AgentStepResult, AgentError> {
        let mut state = self
            .store
            .load(&self.agent_id)
            .await?
            .ok_or_else(|| StateError::NotFound(self.agent_id.clone()))?;
        self.step_once(&mut state, cancel).await
    }

    async fn drive(&self, state: &mut AgentState, cancel: &CancellationToken) -> Result<AgentResult, AgentError> {
        for _ in 0..self.max_turns {
            let step = self.step_once(state, cancel).await?;

            if let Some(output) = step.final_output {
                return Ok(self.result(state, true, Some(output), None));
            }
            if !step.continue_loop {
                let error = state
                    .last_error()
                    .map(str::to_string)
                    .or(step.error)
                    .unwrap_or_else(|| "Agent stopped without a final output".into());
                return Ok(self.result(state, false, None, Some(error)));
            }
        }

        let error = match state.last_error() {
            Some(last) => format!(
                "Maximum turns ({}) reached without completing the goal. Last error: {last}",
                self.max_turns
            ),
            None => format!(
                "Maximum turns ({}) reached without completing the goal",
                self.max_turns
            ),
        };
        Ok(self.result(state, false, None, Some(error)))
    }

    /// One orchestrator step bracketed by events, persistence and metrics.
    async fn step_once(&self, state: &mut AgentState, cancel: &CancellationToken) -> Result<AgentStepResult, AgentError> {
        let turn_index = state.next_turn_index();
        self.events.publish(AgentEvent::StepStarted {
            agent_id: self.agent_id.clone(),
            turn_index,
            timestamp: Utc::now(),
        });
        debug!(agent_id = %self.agent_id, turn_index, "Step starting");

        let started = Instant::now();
        let step = self
            .orchestrator
            .execute_step(state, &self.tools, cancel)
            .await?;
        self.store.save(&self.agent_id, state).await?;
        self.metrics
            .record_turn(&self.agent_id, turn_index, started.elapsed());

        self.events.publish(AgentEvent::StepCompleted {
            agent_id: self.agent_id.clone(),
            turn_index,
            continue_loop: step.continue_loop,
            timestamp: Utc::now(),
        });
        debug!(
            agent_id = %self.agent_id,
            turn_index,
            continue_loop = step.continue_loop,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Step completed"
        );
        Ok(step)
    }

    /// Stored state, or a fresh one. A stored non-blank goal is kept.
    async fn load_or_create(&self, goal: &str) -> Result<AgentState, AgentError> {
        match self.store.load(&self.agent_id).await? {
            Some(mut state) => {
                if state.goal.trim().is_empty() {
                    state.goal = goal.to_string();
                } else if state.goal != goal {
                    warn!(
                        agent_id = %self.agent_id,
                        stored_goal = %state.goal,
                        requested_goal = goal,
                        "Resuming with the stored goal"
                    );
                }
                Ok(state)
            }
            None => Ok(AgentState::new(&self.agent_id, goal)),
        }
    }

    fn result(&self, state: &AgentState, succeeded: bool, final_output: Option<String>, error: Option<String>) -> AgentResult {
        AgentResult {
            agent_id: self.agent_id.clone(),
            succeeded,
            final_output,
            error,
            turns: state.turns.len(),
        }
    }
}
