//! End-to-end tests of the connection facade over the tokio executor.
//!
//! The wire connection is an in-memory fake; everything between the public
//! API and that fake is the real stack.

use anyhow::Result;
use crucible_tooling::{
    BuildAction, BuildActionRequest, BuildPhase, CancellationTokenSource, ConnectionError,
    ConnectionParameters, ConnectionRegistry, ConsumerConnection, LongRunningOperation, Model,
    ModelType, OperationParameters, PhaseResultSink, ProjectConnection, TestSelection,
    TokioActionExecutor, ToolingError,
};
use serde::Deserialize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Wire connection answering from memory. Builds run until cancelled when
/// `hang_builds` is set.
#[derive(Default)]
struct FakeWire {
    hang_builds: AtomicBool,
    build_started: Mutex<Option<mpsc::Sender<()>>>,
    changed: Mutex<Vec<Vec<String>>>,
    entry_points: Mutex<Vec<String>>,
}

impl FakeWire {
    fn hanging(started: mpsc::Sender<()>) -> Self {
        Self {
            hang_builds: AtomicBool::new(true),
            build_started: Mutex::new(Some(started)),
            ..Default::default()
        }
    }

    fn seen(&self, params: &OperationParameters) {
        self.entry_points
            .lock()
            .unwrap()
            .push(params.entry_point().to_string());
    }
}

impl ConsumerConnection for FakeWire {
    fn display_name(&self) -> String {
        "in-memory daemon".to_string()
    }

    fn fetch_model(
        &self,
        model_type: &ModelType,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.seen(params);
        match model_type.name() {
            "BuildEnvironment" => Ok(serde_json::json!({
                "engine_version": "8.4",
                "project_dir": params.connection().project_dir,
            })),
            other => Err(ConnectionError::Daemon(format!("unknown model {}", other))),
        }
    }

    fn run_build(&self, params: &OperationParameters) -> Result<(), ConnectionError> {
        self.seen(params);
        if let Some(started) = self.build_started.lock().unwrap().take() {
            let _ = started.send(());
        }
        if self.hang_builds.load(Ordering::SeqCst) {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                params.cancellation_token().ensure_not_cancelled()?;
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(ConnectionError::Transport("build never finished".to_string()));
        }
        Ok(())
    }

    fn run_tests(
        &self,
        selection: &TestSelection,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.seen(params);
        if selection.test_classes.iter().any(|c| c.ends_with("FlakyTest")) {
            return Err(ConnectionError::Daemon("1 test failed".to_string()));
        }
        Ok(())
    }

    fn run_build_action(
        &self,
        action: &BuildActionRequest,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.seen(params);
        Ok(serde_json::json!({ "action": action.name, "tasks": params.tasks() }))
    }

    fn run_phased_build_action(
        &self,
        actions: &[(BuildPhase, BuildActionRequest)],
        sink: &mut PhaseResultSink<'_>,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.seen(params);
        for (phase, action) in actions {
            sink(
                *phase,
                serde_json::json!({ "action": action.name, "tasks": [] }),
            )?;
        }
        Ok(())
    }

    fn notify_daemons_about_changed_paths(
        &self,
        changed_paths: &[String],
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.seen(params);
        self.changed.lock().unwrap().push(changed_paths.to_vec());
        Ok(())
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct BuildEnvironment {
    engine_version: String,
    project_dir: String,
}

impl Model for BuildEnvironment {
    const TYPE: ModelType = ModelType::capability("BuildEnvironment");
}

#[derive(Debug, Deserialize, PartialEq)]
struct ActionEcho {
    action: String,
    tasks: Vec<String>,
}

struct Echo(&'static str);

impl BuildAction for Echo {
    type Output = ActionEcho;

    fn name(&self) -> &str {
        self.0
    }
}

fn open(
    registry: &ConnectionRegistry,
    wire: Arc<FakeWire>,
    runtime: &tokio::runtime::Runtime,
) -> Arc<ProjectConnection> {
    let executor = Arc::new(TokioActionExecutor::new(wire, runtime.handle().clone()));
    registry.connect(executor, ConnectionParameters::new("/work/app"))
}

#[test]
fn test_blocking_operations_round_trip() -> Result<()> {
    init_test_logging();
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = ConnectionRegistry::new();
    let wire = Arc::new(FakeWire::default());
    let connection = open(&registry, wire.clone(), &runtime);

    let env: BuildEnvironment = connection.get_model()?;
    assert_eq!(env.engine_version, "8.4");
    assert_eq!(env.project_dir, "/work/app");

    connection.new_build().for_tasks(["assemble"]).run()?;
    connection
        .new_test_launcher()
        .with_test_classes(["app.ParserTest"])
        .run()?;

    let echo = connection.action(Echo("list-tasks")).for_tasks(["help"]).run()?;
    assert_eq!(
        echo,
        ActionEcho {
            action: "list-tasks".to_string(),
            tasks: vec!["help".to_string()],
        }
    );

    connection.notify_daemons_about_changed_paths(&["/work/app/src/A.java", "/work/app/build.gradle"])?;
    assert_eq!(
        *wire.changed.lock().unwrap(),
        vec![vec![
            "/work/app/src/A.java".to_string(),
            "/work/app/build.gradle".to_string()
        ]]
    );

    assert_eq!(
        *wire.entry_points.lock().unwrap(),
        vec![
            "ModelBuilder API",
            "Build API",
            "TestLauncher API",
            "BuildActionExecuter API",
            "Notify daemons about changed paths API",
        ]
    );

    connection.close();
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn test_failures_carry_display_name_and_cause() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = ConnectionRegistry::new();
    let connection = open(&registry, Arc::new(FakeWire::default()), &runtime);

    let err = connection
        .new_test_launcher()
        .with_test_classes(["app.FlakyTest"])
        .run()
        .unwrap_err();
    assert_eq!(err.to_string(), "Could not execute tests using in-memory daemon.");
    assert_eq!(
        err.cause(),
        Some(&ConnectionError::Daemon("1 test failed".to_string()))
    );
    assert!(std::error::Error::source(&err).is_some());

    let err = connection
        .notify_daemons_about_changed_paths(&["src/B.java"])
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("src/B.java"));

    connection.close();
    Ok(())
}

#[test]
fn test_phased_action_over_executor() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = ConnectionRegistry::new();
    let connection = open(&registry, Arc::new(FakeWire::default()), &runtime);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let loaded = seen.clone();
    let finished = seen.clone();
    connection
        .action_builder()
        .projects_loaded(Echo("sync-model"), move |echo| {
            loaded.lock().unwrap().push(echo.action)
        })?
        .build_finished(Echo("collect-reports"), move |echo| {
            finished.lock().unwrap().push(echo.action)
        })?
        .build()
        .run()?;

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["sync-model".to_string(), "collect-reports".to_string()]
    );
    connection.close();
    Ok(())
}

#[test]
fn test_caller_token_cancels_running_build() -> Result<()> {
    init_test_logging();
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = ConnectionRegistry::new();
    let (started_tx, started_rx) = mpsc::channel();
    let connection = open(&registry, Arc::new(FakeWire::hanging(started_tx)), &runtime);

    let source = CancellationTokenSource::new();
    let (done_tx, done_rx) = mpsc::channel();
    connection
        .new_build()
        .with_cancellation_token(source.token())
        .run_with(move |result: Result<(), ToolingError>| {
            let _ = done_tx.send(result);
        });

    started_rx.recv_timeout(Duration::from_secs(5))?;
    source.cancel();

    let err = done_rx.recv_timeout(Duration::from_secs(5))?.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Could not execute build using in-memory daemon.");

    connection.close();
    Ok(())
}

#[test]
fn test_close_all_now_cancels_in_flight_work() -> Result<()> {
    init_test_logging();
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = ConnectionRegistry::new();
    let (started_tx, started_rx) = mpsc::channel();
    let busy = open(&registry, Arc::new(FakeWire::hanging(started_tx)), &runtime);
    let idle = open(&registry, Arc::new(FakeWire::default()), &runtime);

    let (done_tx, done_rx) = mpsc::channel();
    busy.new_build()
        .run_with(move |result: Result<(), ToolingError>| {
            let _ = done_tx.send(result);
        });
    started_rx.recv_timeout(Duration::from_secs(5))?;

    registry.close_all_now();

    let err = done_rx.recv_timeout(Duration::from_secs(5))?.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(registry.len(), 2);

    let err = idle.new_build().run().unwrap_err();
    assert_eq!(err.cause(), Some(&ConnectionError::Stopped));

    registry.close_all();
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_fetch_on_current_runtime() -> Result<()> {
    let registry = ConnectionRegistry::new();
    let executor = Arc::new(TokioActionExecutor::new(
        Arc::new(FakeWire::default()),
        tokio::runtime::Handle::current(),
    ));
    let connection = registry.connect(executor, ConnectionParameters::new("/work/lib"));

    let env = connection.fetch_model::<BuildEnvironment>().await?;
    assert_eq!(env.project_dir, "/work/lib");

    connection.new_build().run_async().await?;
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_calls_from_runtime_thread() -> Result<()> {
    init_test_logging();
    let registry = ConnectionRegistry::new();
    let wire = Arc::new(FakeWire::default());
    let executor = Arc::new(TokioActionExecutor::new(
        wire.clone(),
        tokio::runtime::Handle::current(),
    ));
    let connection = registry.connect(executor, ConnectionParameters::new("/work/app"));

    connection.notify_daemons_about_changed_paths(&["/work/app/src/A.java"])?;
    let env: BuildEnvironment = connection.get_model()?;
    assert_eq!(env.engine_version, "8.4");

    connection
        .notify_daemons_about_changed_paths_async(&["/work/app/src/B.java"])
        .await?;
    assert_eq!(
        *wire.changed.lock().unwrap(),
        vec![
            vec!["/work/app/src/A.java".to_string()],
            vec!["/work/app/src/B.java".to_string()],
        ]
    );
    Ok(())
}

#[test]
fn test_connection_parameters_from_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "project_dir = \"/work/app\"")?;
    writeln!(file, "daemon_max_idle_time_secs = 600")?;
    writeln!(file, "verbose_logging = true")?;

    let parameters = ConnectionParameters::load(file.path())?;
    assert_eq!(parameters.project_dir, std::path::PathBuf::from("/work/app"));
    assert_eq!(
        parameters.daemon_max_idle_time(),
        Some(Duration::from_secs(600))
    );
    assert!(parameters.search_upwards);
    assert!(parameters.verbose_logging);
    Ok(())
}
