//! Custom actions executed inside the daemon.
//!
//! A [`BuildAction`] is resolved by name on the daemon side and returns a
//! serialized result. Phased actions attach one action to each
//! [`BuildPhase`] and hand back each phase's result as soon as it exists.

use crate::action::ConsumerAction;
use crate::connection::{BuildActionRequest, BuildPhase};
use crate::dispatcher::{Dispatcher, Prepared};
use crate::error::{ConnectionError, ToolingError};
use crate::handler::ResultHandler;
use crate::launcher::LongRunningOperation;
use crate::operation::{entry_points, OperationOptions};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// An action the daemon runs on the caller's behalf.
pub trait BuildAction: Send + 'static {
    type Output: DeserializeOwned + Send + 'static;

    /// Name the daemon resolves the action by
    fn name(&self) -> &str;

    /// Input for the action
    fn payload(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

pub(crate) fn request_for<A: BuildAction>(action: &A) -> BuildActionRequest {
    BuildActionRequest {
        name: action.name().to_string(),
        payload: action.payload(),
    }
}

fn decode<T: DeserializeOwned>(action: &str, value: serde_json::Value) -> Result<T, ConnectionError> {
    serde_json::from_value(value).map_err(|e| {
        ConnectionError::UnexpectedResult(format!(
            "result of build action '{}' could not be decoded: {}",
            action, e
        ))
    })
}

/// Runs one build action and returns its result.
pub struct BuildActionExecuter<T> {
    dispatcher: Dispatcher,
    options: OperationOptions,
    request: BuildActionRequest,
    _output: PhantomData<fn() -> T>,
}

impl<T> BuildActionExecuter<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(dispatcher: Dispatcher, request: BuildActionRequest) -> Self {
        Self {
            dispatcher,
            options: OperationOptions::default(),
            request,
            _output: PhantomData,
        }
    }

    pub fn run(self) -> Result<T, ToolingError> {
        self.prepare().run()
    }

    pub fn run_with<H>(self, handler: H)
    where
        H: ResultHandler<T> + 'static,
    {
        self.prepare().run_with(Box::new(handler))
    }

    pub async fn run_async(self) -> Result<T, ToolingError> {
        self.prepare().run_async().await
    }

    fn prepare(self) -> Prepared<T> {
        let params = self
            .options
            .to_parameters(entry_points::BUILD_ACTION, self.dispatcher.connection().clone())
            .build();
        let request = self.request;
        let action = ConsumerAction::new(params, move |connection, params| {
            let value = connection.run_build_action(&request, params)?;
            decode(&request.name, value)
        });
        let transformer = self.dispatcher.transformer(|display_name| {
            format!("Could not run build action using {}.", display_name)
        });
        Prepared::new(self.dispatcher, action, transformer)
    }
}

impl<T> LongRunningOperation for BuildActionExecuter<T> {
    fn options_mut(&mut self) -> &mut OperationOptions {
        &mut self.options
    }
}

type PhaseHandler = Box<dyn FnOnce(serde_json::Value) -> Result<(), ConnectionError> + Send>;

struct PhaseAction {
    phase: BuildPhase,
    request: BuildActionRequest,
    handler: PhaseHandler,
}

/// Collects at most one action per build phase.
pub struct PhasedBuildActionBuilder {
    dispatcher: Dispatcher,
    phases: Vec<PhaseAction>,
}

impl PhasedBuildActionBuilder {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            phases: Vec::new(),
        }
    }

    /// Run `action` once all projects are loaded. `handler` receives its
    /// result on an executor thread.
    pub fn projects_loaded<A, H>(self, action: A, handler: H) -> Result<Self, ToolingError>
    where
        A: BuildAction,
        H: FnOnce(A::Output) + Send + 'static,
    {
        self.add_phase(BuildPhase::ProjectsLoaded, action, handler)
    }

    /// Run `action` after the requested tasks have executed.
    pub fn build_finished<A, H>(self, action: A, handler: H) -> Result<Self, ToolingError>
    where
        A: BuildAction,
        H: FnOnce(A::Output) + Send + 'static,
    {
        self.add_phase(BuildPhase::BuildFinished, action, handler)
    }

    fn add_phase<A, H>(mut self, phase: BuildPhase, action: A, handler: H) -> Result<Self, ToolingError>
    where
        A: BuildAction,
        H: FnOnce(A::Output) + Send + 'static,
    {
        if self.phases.iter().any(|p| p.phase == phase) {
            return Err(ToolingError::invalid_argument(format!(
                "{} action has already been added. Only one action per phase is allowed.",
                phase
            )));
        }

        let request = request_for(&action);
        let name = request.name.clone();
        let handler: PhaseHandler = Box::new(move |value| {
            handler(decode(&name, value)?);
            Ok(())
        });
        self.phases.push(PhaseAction {
            phase,
            request,
            handler,
        });
        Ok(self)
    }

    pub fn build(self) -> PhasedBuildActionExecuter {
        PhasedBuildActionExecuter {
            dispatcher: self.dispatcher,
            options: OperationOptions::default(),
            phases: self.phases,
        }
    }
}

/// Runs a phased build action. Completes with `()` after every phase
/// handler has been called.
pub struct PhasedBuildActionExecuter {
    dispatcher: Dispatcher,
    options: OperationOptions,
    phases: Vec<PhaseAction>,
}

impl PhasedBuildActionExecuter {
    pub fn phases(&self) -> Vec<BuildPhase> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    pub fn run(self) -> Result<(), ToolingError> {
        self.prepare().run()
    }

    pub fn run_with<H>(self, handler: H)
    where
        H: ResultHandler<()> + 'static,
    {
        self.prepare().run_with(Box::new(handler))
    }

    pub async fn run_async(self) -> Result<(), ToolingError> {
        self.prepare().run_async().await
    }

    fn prepare(self) -> Prepared<()> {
        let params = self
            .options
            .to_parameters(
                entry_points::PHASED_BUILD_ACTION,
                self.dispatcher.connection().clone(),
            )
            .build();

        let mut requests = Vec::with_capacity(self.phases.len());
        let mut handlers = HashMap::with_capacity(self.phases.len());
        for phase_action in self.phases {
            requests.push((phase_action.phase, phase_action.request));
            handlers.insert(phase_action.phase, phase_action.handler);
        }

        let action = ConsumerAction::new(params, move |connection, params| {
            let mut handlers = handlers;
            {
                let mut sink = |phase: BuildPhase, value: serde_json::Value| {
                    debug!(phase = %phase, "Phase result received");
                    match handlers.remove(&phase) {
                        Some(handler) => handler(value),
                        None => Err(ConnectionError::UnexpectedResult(format!(
                            "no pending action for phase {}",
                            phase
                        ))),
                    }
                };
                connection.run_phased_build_action(&requests, &mut sink, params)?;
            }
            // every registered phase must have reported exactly once
            match requests.iter().find(|(phase, _)| handlers.contains_key(phase)) {
                Some((phase, _)) => Err(ConnectionError::UnexpectedResult(format!(
                    "no result for phase {}",
                    phase
                ))),
                None => Ok(()),
            }
        });
        let transformer = self.dispatcher.transformer(|display_name| {
            format!("Could not run phased build action using {}.", display_name)
        });
        Prepared::new(self.dispatcher, action, transformer)
    }
}

impl LongRunningOperation for PhasedBuildActionExecuter {
    fn options_mut(&mut self) -> &mut OperationOptions {
        &mut self.options
    }
}
