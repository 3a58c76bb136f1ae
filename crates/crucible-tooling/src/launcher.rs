//! Build and test launchers.

use crate::action::ConsumerAction;
use crate::cancellation::CancellationToken;
use crate::connection::TestSelection;
use crate::dispatcher::{Dispatcher, Prepared};
use crate::error::ToolingError;
use crate::handler::ResultHandler;
use crate::operation::{entry_points, OperationOptions};

/// Settings common to every operation that runs a build in the daemon.
pub trait LongRunningOperation: Sized {
    fn options_mut(&mut self) -> &mut OperationOptions;

    /// Replace the tasks to execute.
    fn for_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options_mut().tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the command-line style arguments passed to the build.
    fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options_mut().arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    fn add_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options_mut()
            .arguments
            .extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Run the build with exactly these environment variables instead of
    /// the daemon's own.
    fn with_environment<I, K, V>(mut self, environment: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options_mut().environment = Some(
            environment
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Use a caller-owned token instead of a fresh one per run.
    fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.options_mut().cancellation_token = Some(token);
        self
    }
}

/// Runs tasks in the daemon.
pub struct BuildLauncher {
    dispatcher: Dispatcher,
    options: OperationOptions,
}

impl BuildLauncher {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            options: OperationOptions::default(),
        }
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
            .to_parameters(entry_points::BUILD, self.dispatcher.connection().clone())
            .build();
        let action = ConsumerAction::new(params, |connection, params| connection.run_build(params));
        let transformer = self
            .dispatcher
            .transformer(|display_name| format!("Could not execute build using {}.", display_name));
        Prepared::new(self.dispatcher, action, transformer)
    }
}

impl LongRunningOperation for BuildLauncher {
    fn options_mut(&mut self) -> &mut OperationOptions {
        &mut self.options
    }
}

/// Runs a selection of tests in the daemon.
pub struct TestLauncher {
    dispatcher: Dispatcher,
    options: OperationOptions,
    selection: TestSelection,
}

impl TestLauncher {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            options: OperationOptions::default(),
            selection: TestSelection::default(),
        }
    }

    pub fn with_test_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection
            .test_classes
            .extend(classes.into_iter().map(Into::into));
        self
    }

    pub fn with_test_methods<I, S>(mut self, class: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection
            .test_methods
            .push((class.into(), methods.into_iter().map(Into::into).collect()));
        self
    }

    /// Restrict `classes` to the test task at `task`.
    pub fn with_task_and_test_classes<I, S>(mut self, task: impl Into<String>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection
            .task_test_classes
            .push((task.into(), classes.into_iter().map(Into::into).collect()));
        self
    }

    pub fn selection(&self) -> &TestSelection {
        &self.selection
    }

    pub fn run(self) -> Result<(), ToolingError> {
        self.prepare()?.run()
    }

    /// Fails immediately, without calling `handler`, when no tests were
    /// selected.
    pub fn run_with<H>(self, handler: H) -> Result<(), ToolingError>
    where
        H: ResultHandler<()> + 'static,
    {
        self.prepare()?.run_with(Box::new(handler));
        Ok(())
    }

    pub async fn run_async(self) -> Result<(), ToolingError> {
        self.prepare()?.run_async().await
    }

    fn prepare(self) -> Result<Prepared<()>, ToolingError> {
        if self.selection.is_empty() {
            return Err(ToolingError::invalid_argument(
                "No test declarations provided.",
            ));
        }

        let params = self
            .options
            .to_parameters(entry_points::TEST_LAUNCHER, self.dispatcher.connection().clone())
            .build();
        let selection = self.selection;
        let action = ConsumerAction::new(params, move |connection, params| {
            connection.run_tests(&selection, params)
        });
        let transformer = self
            .dispatcher
            .transformer(|display_name| format!("Could not execute tests using {}.", display_name));
        Ok(Prepared::new(self.dispatcher, action, transformer))
    }
}

impl LongRunningOperation for TestLauncher {
    fn options_mut(&mut self) -> &mut OperationOptions {
        &mut self.options
    }
}
