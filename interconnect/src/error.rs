use std::fmt::{Debug, Display};
use std::path::PathBuf;

use thiserror::Error;

use crate::adapt::SynthesisError;
use crate::clock::ClockConflictError;
use crate::compat::ProtocolError;
use crate::deps::arcstr::ArcStr;
use crate::fmt::ParseRefError;
use crate::graph::error::StructuralError;

pub type Result<T> = std::result::Result<T, InterconnectError>;

pub struct InterconnectError {
    pub(crate) source: ErrorSource,
    pub(crate) context: Vec<ErrorContext>,
}

impl InterconnectError {
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }

    pub fn context(&self) -> &[ErrorContext] {
        &self.context
    }
}

impl std::error::Error for InterconnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for InterconnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Error:\n{}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for item in self.context.iter() {
                writeln!(f, "\twhile {}", item)?;
            }
        }
        Ok(())
    }
}

impl Debug for InterconnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for (i, item) in self.context.iter().enumerate() {
                writeln!(f, "\t{}: {:?}", i, item)?;
            }
        }
        Ok(())
    }
}

impl<T> From<T> for InterconnectError
where
    T: Into<ErrorSource>,
{
    fn from(value: T) -> Self {
        Self {
            source: value.into(),
            context: Vec::new(),
        }
    }
}

impl InterconnectError {
    pub fn new(source: impl Into<ErrorSource>) -> Self {
        Self {
            source: source.into(),
            context: Vec::new(),
        }
    }

    pub fn from_context(source: impl Into<ErrorSource>, ctx: impl Into<ErrorContext>) -> Self {
        Self {
            source: source.into(),
            context: vec![ctx.into()],
        }
    }

    pub fn with_context(mut self, ctx: impl Into<ErrorContext>) -> Self {
        self.context.push(ctx.into());
        self
    }

    #[inline]
    pub fn into_inner(self) -> ErrorSource {
        self.source
    }
}

#[inline]
pub fn with_err_context<T, E, C>(result: std::result::Result<T, E>, ctx: C) -> Result<T>
where
    C: FnOnce() -> ErrorContext,
    E: Into<InterconnectError>,
{
    result.map_err(|err| err.into().with_context(ctx()))
}

/// A stage of assembly resolution.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    Build,
    Validate,
    UnifyClocks,
    CheckProtocols,
    InsertAdapters,
    SynthesizePlans,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Stage::*;
        let name = match *self {
            Build => "building the assembly graph",
            Validate => "validating assembly structure",
            UnifyClocks => "unifying clock domains",
            CheckProtocols => "checking protocol compatibility",
            InsertAdapters => "inserting width adapters",
            SynthesizePlans => "synthesizing adaptation plans",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorContext {
    ResolveAssembly(ArcStr),
    Stage(Stage),
    LoadWorker(ArcStr),
    ReadFile(PathBuf),
    Task(ArcStr),
}

impl From<Stage> for ErrorContext {
    fn from(value: Stage) -> Self {
        Self::Stage(value)
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorContext::*;
        match self {
            ResolveAssembly(name) => write!(f, "resolving assembly {name}"),
            Stage(stage) => write!(f, "{stage}"),
            LoadWorker(name) => write!(f, "loading worker template {name}"),
            ReadFile(path) => write!(f, "reading file {path:?}"),
            Task(task) => write!(f, "{task}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorSource {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("clock conflict: {0}")]
    ClockConflict(#[from] ClockConflictError),

    #[error("protocol incompatibility: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("adapter synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("no such worker template: {0}")]
    WorkerNotFound(ArcStr),

    #[error("invalid port reference: {0}")]
    PortRef(#[from] ParseRefError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing TOML: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("error writing JSON: {0}")]
    Json(#[from] serde_json::Error),
}
