//! Trace configuration: built once, validated at `build()`, immutable
//! afterward. Configuration errors are fatal before `start()`; malformed
//! target strings degrade to warnings like every other resolution problem.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use lorgnette_index::TargetSpec;

use crate::error::ConfigError;
use crate::rank::{Coordinator, EnvCoordinator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Drop all output.
    Silent,
    #[default]
    Normal,
    /// Adds source lines to every event.
    Verbose,
    /// Print directly, bypassing the logging backend.
    Forced,
}

impl Verbosity {
    /// Levels that bypass the logging backend entirely and therefore
    /// cannot be routed to a file destination.
    pub fn bypasses_backend(self) -> bool {
        matches!(self, Self::Silent | Self::Forced)
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Silent => "silent",
            Self::Normal => "normal",
            Self::Verbose => "verbose",
            Self::Forced => "forced",
        };
        f.write_str(label)
    }
}

/// Output routing for the default sinks.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub destination: Option<PathBuf>,
    pub verbosity: Verbosity,
    /// Structured-export path, consumed by tree-export sinks.
    pub export_path: Option<PathBuf>,
}

/// Named coordination backend, or a caller-supplied one.
#[derive(Clone)]
pub enum FrameworkBackend {
    /// Rank from the launcher environment (`RANK` / `WORLD_SIZE`).
    Env,
    Custom(Arc<dyn Coordinator>),
}

impl FrameworkBackend {
    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "env" => Ok(Self::Env),
            other => Err(ConfigError::UnknownFramework {
                name: other.to_string(),
            }),
        }
    }

    pub(crate) fn coordinator(&self) -> Arc<dyn Coordinator> {
        match self {
            Self::Env => Arc::new(EnvCoordinator::new()),
            Self::Custom(coordinator) => coordinator.clone(),
        }
    }
}

impl fmt::Debug for FrameworkBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env => f.write_str("FrameworkBackend::Env"),
            Self::Custom(_) => f.write_str("FrameworkBackend::Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub targets: Vec<TargetSpec>,
    pub exclude_targets: Vec<TargetSpec>,
    pub track_locals: bool,
    pub track_globals: bool,
    pub ranks: Vec<u32>,
    pub framework: Option<FrameworkBackend>,
    /// Source roots the module catalog probes during resolution.
    pub source_roots: Vec<PathBuf>,
    pub output: OutputOptions,
}

impl TraceConfig {
    pub fn builder() -> TraceConfigBuilder {
        TraceConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct TraceConfigBuilder {
    targets: Vec<TargetSpec>,
    raw_targets: Vec<String>,
    exclude_targets: Vec<TargetSpec>,
    raw_excludes: Vec<String>,
    track_locals: bool,
    track_globals: bool,
    ranks: Vec<u32>,
    framework: Option<FrameworkBackend>,
    framework_name: Option<String>,
    source_roots: Vec<PathBuf>,
    output: OutputOptions,
}

impl TraceConfigBuilder {
    pub fn target(mut self, spec: TargetSpec) -> Self {
        self.targets.push(spec);
        self
    }

    /// Raw mini-language spec, parsed at `build()`.
    pub fn target_str(mut self, raw: impl Into<String>) -> Self {
        self.raw_targets.push(raw.into());
        self
    }

    pub fn exclude(mut self, spec: TargetSpec) -> Self {
        self.exclude_targets.push(spec);
        self
    }

    pub fn exclude_str(mut self, raw: impl Into<String>) -> Self {
        self.raw_excludes.push(raw.into());
        self
    }

    pub fn track_locals(mut self, enabled: bool) -> Self {
        self.track_locals = enabled;
        self
    }

    pub fn track_globals(mut self, enabled: bool) -> Self {
        self.track_globals = enabled;
        self
    }

    /// Worker allow-list; requires a coordination backend.
    pub fn ranks(mut self, ranks: impl IntoIterator<Item = u32>) -> Self {
        self.ranks.extend(ranks);
        self
    }

    pub fn framework(mut self, backend: FrameworkBackend) -> Self {
        self.framework = Some(backend);
        self
    }

    /// Coordination backend by name; validated at `build()`.
    pub fn framework_name(mut self, name: impl Into<String>) -> Self {
        self.framework_name = Some(name.into());
        self
    }

    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.destination = Some(path.into());
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.output.verbosity = verbosity;
        self
    }

    pub fn export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.export_path = Some(path.into());
        self
    }

    pub fn build(mut self) -> Result<TraceConfig, ConfigError> {
        for raw in self.raw_targets.drain(..) {
            match TargetSpec::parse(&raw) {
                Ok(spec) => self.targets.push(spec),
                Err(err) => warn!(spec = %raw, error = %err, "ignoring malformed target spec"),
            }
        }
        for raw in self.raw_excludes.drain(..) {
            match TargetSpec::parse(&raw) {
                Ok(spec) => self.exclude_targets.push(spec),
                Err(err) => warn!(spec = %raw, error = %err, "ignoring malformed exclude spec"),
            }
        }

        let framework = match (self.framework, self.framework_name) {
            (Some(backend), _) => Some(backend),
            (None, Some(name)) => Some(FrameworkBackend::by_name(&name)?),
            (None, None) => None,
        };

        if self.targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }
        if self.output.verbosity.bypasses_backend() && self.output.destination.is_some() {
            return Err(ConfigError::ConflictingOutput {
                verbosity: self.output.verbosity,
            });
        }
        if !self.ranks.is_empty() && framework.is_none() {
            return Err(ConfigError::RanksWithoutFramework);
        }

        Ok(TraceConfig {
            targets: self.targets,
            exclude_targets: self.exclude_targets,
            track_locals: self.track_locals,
            track_globals: self.track_globals,
            ranks: self.ranks,
            framework,
            source_roots: self.source_roots,
            output: self.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_targets_are_fatal() {
        let err = TraceConfig::builder().build().expect_err("no targets");
        assert_eq!(err, ConfigError::EmptyTargets);
    }

    #[test]
    fn all_malformed_targets_leave_nothing_to_trace() {
        let err = TraceConfig::builder()
            .target_str("not a module")
            .build()
            .expect_err("only malformed specs");
        assert_eq!(err, ConfigError::EmptyTargets);
    }

    #[test]
    fn silent_verbosity_conflicts_with_file_destination() {
        let err = TraceConfig::builder()
            .target_str("app.train")
            .verbosity(Verbosity::Silent)
            .destination("/tmp/trace.log")
            .build()
            .expect_err("conflicting output");
        assert_eq!(
            err,
            ConfigError::ConflictingOutput {
                verbosity: Verbosity::Silent
            }
        );
    }

    #[test]
    fn forced_verbosity_conflicts_with_file_destination() {
        let err = TraceConfig::builder()
            .target_str("app.train")
            .verbosity(Verbosity::Forced)
            .destination("/tmp/trace.log")
            .build()
            .expect_err("conflicting output");
        assert!(matches!(err, ConfigError::ConflictingOutput { .. }));
    }

    #[test]
    fn ranks_require_a_framework() {
        let err = TraceConfig::builder()
            .target_str("app.train")
            .ranks([0])
            .build()
            .expect_err("ranks without framework");
        assert_eq!(err, ConfigError::RanksWithoutFramework);
    }

    #[test]
    fn unknown_framework_name_is_fatal() {
        let err = TraceConfig::builder()
            .target_str("app.train")
            .framework_name("gossip")
            .build()
            .expect_err("unknown backend");
        assert!(matches!(err, ConfigError::UnknownFramework { .. }));
    }

    #[test]
    fn valid_config_builds() {
        let config = TraceConfig::builder()
            .target_str("app.train:Trainer")
            .exclude_str("app.train:Trainer.warmup()")
            .track_locals(true)
            .track_globals(true)
            .framework_name("env")
            .ranks([0, 1])
            .build()
            .expect("valid config");
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.exclude_targets.len(), 1);
        assert!(config.framework.is_some());
    }
}
