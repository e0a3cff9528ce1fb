//! Error taxonomy: configuration errors are fatal before `start()`,
//! resolution problems are warnings elsewhere, invariant violations detach
//! the dispatcher.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use crate::config::Verbosity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyTargets,
    ConflictingOutput { verbosity: Verbosity },
    UnknownFramework { name: String },
    RanksWithoutFramework,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTargets => write!(f, "at least one target is required"),
            Self::ConflictingOutput { verbosity } => write!(
                f,
                "verbosity `{verbosity}` bypasses the logging backend and cannot be combined with a file destination"
            ),
            Self::UnknownFramework { name } => {
                write!(f, "unknown coordination backend `{name}`; expected `env`")
            }
            Self::RanksWithoutFramework => {
                write!(f, "a rank allow-list requires a coordination backend")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug)]
pub enum TraceError {
    Config(ConfigError),
    /// Another dispatcher already owns the process-wide hook slot.
    AlreadyActive,
    /// This tracer's dispatcher is not the installed one.
    NotActive,
    SinkCreate { path: PathBuf, message: String },
    /// Depth bookkeeping desynchronized from call/return pairing.
    DepthUnderflow { scope: String },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid trace configuration: {err}"),
            Self::AlreadyActive => {
                write!(f, "another dispatcher is already installed; stop it before starting a new trace")
            }
            Self::NotActive => write!(f, "this tracer is not the installed dispatcher"),
            Self::SinkCreate { path, message } => {
                write!(f, "cannot open trace destination {}: {message}", path.display())
            }
            Self::DepthUnderflow { scope } => write!(
                f,
                "call depth underflow at `{scope}`: end without matching run; this is a lorgnette bug, please report it"
            ),
        }
    }
}

impl Error for TraceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for TraceError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
