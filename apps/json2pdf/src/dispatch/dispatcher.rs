use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatch::cancel::CancelSignal;
use crate::dispatch::result::{DispatchResult, UnitReport};
use crate::dispatch::unit::{CompilationUnit, UnitStatus};
use crate::models::DocumentKind;
use crate::render::{Checkpoint, RenderBackend, RenderContext};

struct PendingUnit {
    kind: DocumentKind,
    source: PathBuf,
    handle: JoinHandle<UnitReport>,
}

/// Schedules compilation units onto the blocking pool and collects their outcomes.
pub struct Dispatcher {
    backend: Arc<dyn RenderBackend>,
    shutdown: CancellationToken,
    pending: Vec<PendingUnit>,
    result: DispatchResult,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            shutdown: CancellationToken::new(),
            pending: Vec::new(),
            result: DispatchResult::default(),
        }
    }

    /// Returns a clone of the shared cancellation token so callers can wire their
    /// own triggers. Units only observe it when the run has `interrupt` enabled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Cancels the shared token on Ctrl-C (SIGINT). The listener exits on its own
    /// once the token is cancelled by any other means.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        match result {
                            Ok(()) => info!("Ctrl-C received; interrupting compilation"),
                            Err(err) => error!(error = %err, "failed to listen for Ctrl-C"),
                        }
                        shutdown.cancel();
                    }
                    _ = shutdown.cancelled() => {}
                }
            }
            .with_current_subscriber(),
        )
    }

    /// Derives one unit per configured source and schedules it. Returns the number of
    /// units handed to workers; sources that fail to resolve are recorded as failed
    /// immediately. Never waits on a unit.
    pub fn dispatch(&mut self, config: &Config) -> usize {
        let units = CompilationUnit::derive_all(config);
        if units.is_empty() {
            info!("no CV or cover letter requested; nothing to compile");
            return 0;
        }

        let workers = config
            .max_workers
            .map_or(units.len(), |max| max.get().min(units.len()));
        let permits = Arc::new(Semaphore::new(workers));
        let subscriber = tracing::dispatcher::get_default(|current| current.clone());

        let mut scheduled = 0;
        for unit in units {
            let kind = unit.kind();
            let source = unit.source().to_path_buf();
            if config.debug {
                debug!(unit = %kind, source = %source.display(), output = %unit.output().display(), "unit submitted");
            }

            if let Err(err) = unit.resolve_source() {
                self.result.record(unit.reject(err.into()));
                continue;
            }

            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&permits);
            let subscriber = subscriber.clone();
            let signal = CancelSignal::new(self.shutdown.clone(), config.interrupt);
            let debug = config.debug;
            let task_source = source.clone();

            let handle = tokio::spawn(
                async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await;
                    let worker = tokio::task::spawn_blocking(move || {
                        tracing::dispatcher::with_default(&subscriber, || {
                            let ctx = RenderContext::new(kind, debug, &signal);
                            if signal.should_cancel() {
                                return unit.cancel_before_start(&ctx);
                            }
                            unit.execute(backend.as_ref(), &ctx)
                        })
                    });
                    match worker.await {
                        Ok(report) => report,
                        Err(err) => panicked(kind, task_source, err),
                    }
                }
                .with_current_subscriber(),
            );

            self.pending.push(PendingUnit {
                kind,
                source,
                handle,
            });
            scheduled += 1;
        }

        info!(units = scheduled, workers, "dispatched compilation units");
        scheduled
    }

    /// Waits for every scheduled unit to reach a terminal state. Calling it again
    /// with nothing outstanding returns the same result without side effects.
    pub async fn join(&mut self) -> &DispatchResult {
        if self.pending.is_empty() {
            return &self.result;
        }

        for PendingUnit {
            kind,
            source,
            handle,
        } in std::mem::take(&mut self.pending)
        {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => panicked(kind, source, err),
            };
            self.result.record(report);
        }

        info!(
            succeeded = self.result.count(UnitStatus::Succeeded),
            failed = self.result.count(UnitStatus::Failed),
            interrupted = self.result.count(UnitStatus::Interrupted),
            "all units finished"
        );
        &self.result
    }
}

fn panicked(kind: DocumentKind, source: PathBuf, err: JoinError) -> UnitReport {
    let detail = if err.is_cancelled() {
        "worker task was cancelled".to_string()
    } else {
        match err.try_into_panic() {
            Ok(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string()),
            Err(err) => err.to_string(),
        }
    };
    error!(unit = %kind, code = "WORKER_PANIC", error = %detail, "unit failed");
    UnitReport::panicked(kind, source, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};

    use crate::dispatch::result::{EXIT_FAILED, EXIT_INTERRUPTED, EXIT_SUCCESS};
    use crate::errors::{ConfigError, RenderError, UnitError};
    use crate::logging::capture;
    use crate::render::{DocumentBackend, RenderJob, RenderOutcome, Stage};

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Succeed,
        Fail,
        WaitForCancel,
        Panic,
    }

    struct ScriptedBackend {
        cv: Script,
        cl: Script,
    }

    impl ScriptedBackend {
        fn new(cv: Script, cl: Script) -> Arc<dyn RenderBackend> {
            Arc::new(Self { cv, cl })
        }
    }

    impl RenderBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn render(&self, job: &RenderJob<'_>, ctx: &RenderContext<'_>) -> Result<RenderOutcome, RenderError> {
            let script = match job.kind {
                DocumentKind::Cv => self.cv,
                DocumentKind::CoverLetter => self.cl,
            };
            ctx.enter(Stage::Load);
            let completed = RenderOutcome::Completed {
                output: job.output.to_path_buf(),
                pages: 1,
            };
            match script {
                Script::Succeed => Ok(completed),
                Script::Fail => Err(RenderError::Semantic(vec!["scripted failure".to_string()])),
                Script::WaitForCancel => {
                    let deadline = Instant::now() + Duration::from_secs(10);
                    while Instant::now() < deadline {
                        if ctx.should_cancel() {
                            return Ok(RenderOutcome::Interrupted { stage: Stage::Layout });
                        }
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Ok(completed)
                }
                Script::Panic => panic!("scripted panic"),
            }
        }
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn config(dir: &Path, cv: Option<PathBuf>, cl: Option<PathBuf>) -> Config {
        Config {
            cv_json: cv,
            cl_json: cl,
            output_dir: dir.join("out"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_no_sources_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));

        assert_eq!(dispatcher.dispatch(&config(dir.path(), None, None)), 0);
        let result = dispatcher.join().await;
        assert!(result.is_empty());
        assert_eq!(result.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_single_valid_source_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));

        assert_eq!(dispatcher.dispatch(&config(dir.path(), Some(cv), None)), 1);
        let result = dispatcher.join().await;

        assert_eq!(result.len(), 1);
        assert_eq!(result.status(DocumentKind::Cv), Some(UnitStatus::Succeeded));
        assert_eq!(
            result.get(DocumentKind::Cv).unwrap().output,
            Some(dir.path().join("out").join("cv.pdf"))
        );
        assert_eq!(result.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_missing_source_fails_with_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let cl = write(dir.path(), "cl.json", "{}");
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));

        let config = config(dir.path(), Some(dir.path().join("missing.json")), Some(cl));
        assert_eq!(dispatcher.dispatch(&config), 1);
        let result = dispatcher.join().await;

        let cv = result.get(DocumentKind::Cv).unwrap();
        assert_eq!(cv.status, UnitStatus::Failed);
        assert!(matches!(
            cv.error,
            Some(UnitError::Configuration(ConfigError::MissingSource(_)))
        ));
        assert_eq!(result.status(DocumentKind::CoverLetter), Some(UnitStatus::Succeeded));
        assert_ne!(result.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_unit() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let cl = write(dir.path(), "cl.json", "{}");
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Fail, Script::Succeed));

        dispatcher.dispatch(&config(dir.path(), Some(cv), Some(cl)));
        let result = dispatcher.join().await;

        let cv = result.get(DocumentKind::Cv).unwrap();
        assert_eq!(cv.status, UnitStatus::Failed);
        assert_eq!(cv.error.as_ref().map(UnitError::code), Some("RENDER_ERROR"));
        assert_eq!(result.status(DocumentKind::CoverLetter), Some(UnitStatus::Succeeded));
        assert_eq!(result.exit_code(), EXIT_FAILED);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let cl = write(dir.path(), "cl.json", "{}");
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Panic, Script::Succeed));

        dispatcher.dispatch(&config(dir.path(), Some(cv), Some(cl)));
        let result = dispatcher.join().await;

        let cv = result.get(DocumentKind::Cv).unwrap();
        assert_eq!(cv.status, UnitStatus::Failed);
        match &cv.error {
            Some(UnitError::Panicked(detail)) => assert_eq!(detail, "scripted panic"),
            other => panic!("expected a panic report, got {other:?}"),
        }
        assert_eq!(result.status(DocumentKind::CoverLetter), Some(UnitStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_join_twice_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let (subscriber, logs) = capture::subscriber();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));
        dispatcher.dispatch(&config(dir.path(), Some(cv), None));
        assert_eq!(dispatcher.join().await.len(), 1);
        let lines = logs.lines().len();

        let result = dispatcher.join().await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.status(DocumentKind::Cv), Some(UnitStatus::Succeeded));
        assert_eq!(logs.lines().len(), lines);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_unit() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let mut config = config(dir.path(), Some(cv), None);
        config.interrupt = true;
        let mut dispatcher =
            Dispatcher::new(ScriptedBackend::new(Script::WaitForCancel, Script::Succeed));

        dispatcher.dispatch(&config);
        dispatcher.cancel();
        let result = dispatcher.join().await;

        assert_eq!(result.status(DocumentKind::Cv), Some(UnitStatus::Interrupted));
        assert_eq!(result.exit_code(), EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", CV_JSON);
        let mut config = config(dir.path(), Some(cv), None);
        config.interrupt = true;
        let mut dispatcher = Dispatcher::new(Arc::new(DocumentBackend::new()));

        dispatcher.cancel();
        dispatcher.dispatch(&config);
        let result = dispatcher.join().await;

        assert_eq!(result.status(DocumentKind::Cv), Some(UnitStatus::Interrupted));
        assert!(!config.output_path(DocumentKind::Cv).exists());
    }

    #[tokio::test]
    async fn test_cancel_is_ignored_without_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", CV_JSON);
        let config = config(dir.path(), Some(cv), None);
        let mut dispatcher = Dispatcher::new(Arc::new(DocumentBackend::new()));

        dispatcher.cancellation_token().cancel();
        dispatcher.dispatch(&config);
        let result = dispatcher.join().await;

        assert_eq!(result.status(DocumentKind::Cv), Some(UnitStatus::Succeeded));
        assert!(config.output_path(DocumentKind::Cv).exists());
    }

    #[tokio::test]
    async fn test_single_worker_runs_both_units() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let cl = write(dir.path(), "cl.json", "{}");
        let mut config = config(dir.path(), Some(cv), Some(cl));
        config.max_workers = std::num::NonZeroUsize::new(1);
        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));

        assert_eq!(dispatcher.dispatch(&config), 2);
        let result = dispatcher.join().await;
        assert_eq!(result.count(UnitStatus::Succeeded), 2);
    }

    async fn unit_log_lines(debug: bool) -> (usize, usize) {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", "{}");
        let mut config = config(dir.path(), Some(cv), None);
        config.debug = debug;
        let (subscriber, logs) = capture::subscriber();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut dispatcher = Dispatcher::new(ScriptedBackend::new(Script::Succeed, Script::Succeed));
        dispatcher.dispatch(&config);
        dispatcher.join().await;
        (logs.count("unit=cv"), logs.count("[debug]"))
    }

    #[tokio::test]
    async fn test_debug_logs_every_transition() {
        let (quiet, quiet_debug) = unit_log_lines(false).await;
        let (verbose, verbose_debug) = unit_log_lines(true).await;

        // Without --debug only the terminal line mentions the unit.
        assert_eq!(quiet, 1);
        assert_eq!(quiet_debug, 0);
        assert!(verbose > quiet);
        assert!(verbose_debug > 0);
    }

    const CV_JSON: &str = r#"{
        "personal": { "name": "Grace Hopper" },
        "sections": [
            { "name": "Experience", "items": [
                { "title": "Rear Admiral", "subtitle": "US Navy", "btag": "1943 - 1986", "ttag": "Arlington" }
            ]},
            { "name": "Skills", "items": [ { "category": "Languages", "content": "COBOL, FLOW-MATIC" } ] }
        ]
    }"#;

    const CL_JSON: &str = r#"{
        "sections": [
            { "name": "Letter", "items": [
                { "paragraph": "Dear {{team}} team," , "labels": { "team": "Compiler" } },
                { "paragraph": "I would like to apply." }
            ]}
        ]
    }"#;

    #[tokio::test]
    async fn test_document_backend_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.json", CV_JSON);
        let cl = write(dir.path(), "cl.json", CL_JSON);
        let config = config(dir.path(), Some(cv), Some(cl));
        let mut dispatcher = Dispatcher::new(Arc::new(DocumentBackend::new()));

        assert_eq!(dispatcher.dispatch(&config), 2);
        let result = dispatcher.join().await;

        assert_eq!(result.count(UnitStatus::Succeeded), 2, "{result:?}");
        assert_eq!(result.exit_code(), EXIT_SUCCESS);
        for kind in [DocumentKind::Cv, DocumentKind::CoverLetter] {
            let bytes = fs::read(config.output_path(kind)).unwrap();
            assert!(bytes.starts_with(b"%PDF-1.4"));
        }
    }
}
