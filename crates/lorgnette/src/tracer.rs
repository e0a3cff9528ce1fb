//! Attach/detach control.

use std::sync::Arc;

use tracing::debug;

use lorgnette_index::{FsCatalog, Resolver, SynAnalyzer};

use crate::config::TraceConfig;
use crate::dispatch::Dispatcher;
use crate::error::TraceError;
use crate::hook;
use crate::rank::{Coordinator, RankGate};
use crate::sink::{EventSink, FileSink, LogSink};

/// An owned tracing session: resolves targets at construction, installs
/// its dispatcher on `start`, detaches and flushes on `stop`.
pub struct Tracer {
    config: TraceConfig,
    coordinator: Option<Arc<dyn Coordinator>>,
    dispatcher: Arc<Dispatcher>,
}

impl Tracer {
    /// Builds a tracer with the default sink: the configured file
    /// destination when present, the log sink otherwise.
    pub fn new(config: TraceConfig) -> Result<Self, TraceError> {
        let sink: Arc<dyn EventSink> = match &config.output.destination {
            Some(path) => Arc::new(FileSink::create(path).map_err(|err| {
                TraceError::SinkCreate {
                    path: path.clone(),
                    message: err.to_string(),
                }
            })?),
            None => Arc::new(LogSink::new(config.output.verbosity)),
        };
        Self::with_sink(config, sink)
    }

    /// Builds a tracer routing events into a caller-supplied sink.
    pub fn with_sink(config: TraceConfig, sink: Arc<dyn EventSink>) -> Result<Self, TraceError> {
        let catalog = FsCatalog::new(config.source_roots.iter().cloned());
        let index =
            Resolver::new(&catalog, &SynAnalyzer).resolve(&config.targets, &config.exclude_targets);

        let coordinator = config.framework.as_ref().map(|backend| backend.coordinator());
        let gate = match &coordinator {
            Some(coordinator) => RankGate::new(Some(coordinator.clone()), config.ranks.clone()),
            None => RankGate::open(),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            index,
            sink,
            gate,
            config.track_locals,
            config.track_globals,
        ));

        Ok(Self {
            config,
            coordinator,
            dispatcher,
        })
    }

    /// Installs the dispatcher and, when a rank allow-list is active,
    /// attempts the one-time start-up barrier (best-effort).
    pub fn start(&self) -> Result<(), TraceError> {
        hook::install(self.dispatcher.clone())?;
        if !self.config.ranks.is_empty() {
            if let Some(coordinator) = &self.coordinator {
                match coordinator.barrier() {
                    Ok(()) => debug!("start-up barrier complete"),
                    Err(err) => debug!(error = %err, "skipping start-up barrier"),
                }
            }
        }
        Ok(())
    }

    /// Detaches the hook and flushes the sink. Surfaces an invariant
    /// fault recorded while tracing, if any.
    pub fn stop(&self) -> Result<(), TraceError> {
        hook::uninstall(&self.dispatcher)?;
        self.dispatcher.flush();
        if let Some(fault) = self.dispatcher.take_fault() {
            return Err(fault);
        }
        Ok(())
    }

    /// Scoped acquisition: starts now, stops when the guard drops.
    pub fn start_scoped(&self) -> Result<TraceGuard<'_>, TraceError> {
        self.start()?;
        Ok(TraceGuard { tracer: self })
    }

    /// Direct access for composition and tests; production hosts go
    /// through `hook::emit`.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}

pub struct TraceGuard<'a> {
    tracer: &'a Tracer,
}

impl Drop for TraceGuard<'_> {
    fn drop(&mut self) {
        let _ = self.tracer.stop();
    }
}
