//! Per-dispatch parameters.
//!
//! Every operation sent to the daemon carries exactly one
//! [`OperationParameters`], built fresh for that dispatch. Builders keep an
//! [`OperationOptions`] (what the caller configured) and turn it into
//! parameters at run time.

use crate::cancellation::{CancellationToken, CancellationTokenSource};
use crate::config::ConnectionParameters;
use crate::model::ModelType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Diagnostic labels naming the public API an operation came from.
pub mod entry_points {
    pub const BUILD: &str = "Build API";
    pub const MODEL_BUILDER: &str = "ModelBuilder API";
    pub const TEST_LAUNCHER: &str = "TestLauncher API";
    pub const BUILD_ACTION: &str = "BuildActionExecuter API";
    pub const PHASED_BUILD_ACTION: &str = "PhasedBuildActionExecuter API";
    pub const NOTIFY_CHANGED_PATHS: &str = "Notify daemons about changed paths API";
}

/// Immutable description of one dispatched operation.
#[derive(Debug, Clone)]
pub struct OperationParameters {
    entry_point: String,
    cancellation_token: CancellationToken,
    connection: Arc<ConnectionParameters>,
    tasks: Vec<String>,
    arguments: Vec<String>,
    environment: Option<BTreeMap<String, String>>,
    model_type: Option<ModelType>,
}

impl OperationParameters {
    pub fn builder(
        entry_point: impl Into<String>,
        connection: Arc<ConnectionParameters>,
    ) -> OperationParametersBuilder {
        OperationParametersBuilder::new(entry_point, connection)
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn connection(&self) -> &ConnectionParameters {
        &self.connection
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// `None` means the daemon inherits its own environment.
    pub fn environment(&self) -> Option<&BTreeMap<String, String>> {
        self.environment.as_ref()
    }

    pub fn model_type(&self) -> Option<&ModelType> {
        self.model_type.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct OperationParametersBuilder {
    entry_point: String,
    connection: Arc<ConnectionParameters>,
    cancellation_token: Option<CancellationToken>,
    tasks: Vec<String>,
    arguments: Vec<String>,
    environment: Option<BTreeMap<String, String>>,
    model_type: Option<ModelType>,
}

impl OperationParametersBuilder {
    pub fn new(entry_point: impl Into<String>, connection: Arc<ConnectionParameters>) -> Self {
        Self {
            entry_point: entry_point.into(),
            connection,
            cancellation_token: None,
            tasks: Vec::new(),
            arguments: Vec::new(),
            environment: None,
            model_type: None,
        }
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn environment(mut self, environment: Option<BTreeMap<String, String>>) -> Self {
        self.environment = environment;
        self
    }

    pub fn model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }

    /// Without an explicit token a fresh one is minted, so no two
    /// operations built this way share cancellation state.
    pub fn build(self) -> OperationParameters {
        let cancellation_token = self
            .cancellation_token
            .unwrap_or_else(|| CancellationTokenSource::new().token());

        OperationParameters {
            entry_point: self.entry_point,
            cancellation_token,
            connection: self.connection,
            tasks: self.tasks,
            arguments: self.arguments,
            environment: self.environment,
            model_type: self.model_type,
        }
    }
}

/// Caller-assembled settings shared by every long-running operation builder.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    pub(crate) tasks: Vec<String>,
    pub(crate) arguments: Vec<String>,
    pub(crate) environment: Option<BTreeMap<String, String>>,
    pub(crate) cancellation_token: Option<CancellationToken>,
}

impl OperationOptions {
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn environment(&self) -> Option<&BTreeMap<String, String>> {
        self.environment.as_ref()
    }

    pub(crate) fn to_parameters(
        &self,
        entry_point: &str,
        connection: Arc<ConnectionParameters>,
    ) -> OperationParametersBuilder {
        let builder = OperationParameters::builder(entry_point, connection)
            .tasks(self.tasks.clone())
            .arguments(self.arguments.clone())
            .environment(self.environment.clone());

        match &self.cancellation_token {
            Some(token) => builder.cancellation_token(token.clone()),
            None => builder,
        }
    }
}
