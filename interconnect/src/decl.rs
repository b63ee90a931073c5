//! Declarations of workers and assemblies, as read from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deps::arcstr::ArcStr;
use crate::error::{with_err_context, ErrorContext, Result};
use crate::fmt::signal::parse_port_ref;
use crate::graph::error::StructuralError;
use crate::graph::worker::{PortDecl, Worker};
use crate::protocol::{Direction, PortProtocol, Profile};

/// A worker template file.
///
/// ```toml
/// name = "fir"
///
/// [[port]]
/// name = "in"
/// direction = "input"
/// protocol = { data_width = 32 }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerDecl {
    pub name: ArcStr,
    #[serde(default, rename = "port")]
    pub ports: Vec<PortDecl>,
}

impl WorkerDecl {
    pub fn from_toml(input: &str) -> Result<Self> {
        let value = toml::from_str(input)?;
        Ok(value)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = with_err_context(std::fs::read_to_string(path), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })?;
        with_err_context(Self::from_toml(&input), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })
    }

    pub fn into_worker(self) -> std::result::Result<Worker, StructuralError> {
        Worker::new(self.name, self.ports)
    }
}

/// A placement of a named worker template.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub name: ArcStr,
    pub worker: ArcStr,
}

/// A port on the assembly boundary.
///
/// If `instance` and `port` are given, the boundary port mirrors that instance
/// port and is connected to it; the remaining fields override the mirrored
/// attributes. Otherwise `direction` and `profile` describe a free-standing
/// boundary port that connections attach to by name.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExternalDecl {
    pub name: ArcStr,
    #[serde(default)]
    pub instance: Option<ArcStr>,
    #[serde(default)]
    pub port: Option<ArcStr>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub protocol: Option<PortProtocol>,
    /// Name of the clock driving this boundary port.
    #[serde(default)]
    pub clock: Option<ArcStr>,
}

impl ExternalDecl {
    /// Creates a boundary port exposing `instance.port`.
    pub fn mirror(
        name: impl Into<ArcStr>,
        instance: impl Into<ArcStr>,
        port: impl Into<ArcStr>,
    ) -> Self {
        Self {
            name: name.into(),
            instance: Some(instance.into()),
            port: Some(port.into()),
            index: None,
            count: None,
            direction: None,
            profile: None,
            protocol: None,
            clock: None,
        }
    }
}

/// A reference to the elements of a port bound into a connection.
///
/// Either the shorthand `"instance.port"` / `"instance.port[index]"`, or a table.
/// A table without an `instance` refers to a boundary port.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachDecl {
    Ref(String),
    Full {
        #[serde(default)]
        instance: Option<ArcStr>,
        port: ArcStr,
        #[serde(default)]
        index: usize,
        #[serde(default)]
        count: Option<usize>,
    },
}

/// An [`AttachDecl`] with its shorthand parsed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AttachTarget {
    pub instance: Option<ArcStr>,
    pub port: ArcStr,
    pub index: usize,
    /// `None` binds every element from `index` to the end of the port.
    pub count: Option<usize>,
}

impl AttachDecl {
    pub fn new(instance: impl Into<ArcStr>, port: impl Into<ArcStr>) -> Self {
        Self::Full {
            instance: Some(instance.into()),
            port: port.into(),
            index: 0,
            count: None,
        }
    }

    pub fn target(&self) -> Result<AttachTarget> {
        Ok(match self {
            Self::Ref(text) => {
                let parsed = parse_port_ref(text)?;
                AttachTarget {
                    instance: Some(ArcStr::from(parsed.instance)),
                    port: ArcStr::from(parsed.port),
                    index: parsed.index.unwrap_or(0),
                    count: parsed.index.map(|_| 1),
                }
            }
            Self::Full {
                instance,
                port,
                index,
                count,
            } => AttachTarget {
                instance: instance.clone(),
                port: port.clone(),
                index: *index,
                count: *count,
            },
        })
    }
}

impl From<&str> for AttachDecl {
    fn from(value: &str) -> Self {
        Self::Ref(value.to_string())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDecl {
    /// Defaults to `<instance>_<port>` of the first attachment.
    #[serde(default)]
    pub name: Option<ArcStr>,
    #[serde(rename = "attach")]
    pub attachments: Vec<AttachDecl>,
}

impl ConnectionDecl {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: Some(name.into()),
            attachments: Vec::new(),
        }
    }

    /// A consuming method to add an attachment.
    #[inline]
    pub fn with_attachment(mut self, attachment: impl Into<AttachDecl>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}

/// A declared assembly.
///
/// ```toml
/// name = "pipeline"
///
/// [[instance]]
/// name = "src"
/// worker = "source"
///
/// [[connection]]
/// attach = ["src.out", "fir.in"]
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AssemblyDecl {
    pub name: ArcStr,
    /// The designated control clock, if the assembly names one.
    #[serde(default)]
    pub control_clock: Option<ArcStr>,
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceDecl>,
    #[serde(default, rename = "external")]
    pub externals: Vec<ExternalDecl>,
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionDecl>,
}

impl AssemblyDecl {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            control_clock: None,
            instances: Vec::new(),
            externals: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// A consuming method to place an instance of `worker`.
    pub fn with_instance(mut self, name: impl Into<ArcStr>, worker: impl Into<ArcStr>) -> Self {
        self.instances.push(InstanceDecl {
            name: name.into(),
            worker: worker.into(),
        });
        self
    }

    /// A consuming method to add a boundary port.
    #[inline]
    pub fn with_external(mut self, external: ExternalDecl) -> Self {
        self.externals.push(external);
        self
    }

    /// A consuming method to add a connection.
    #[inline]
    pub fn with_connection(mut self, connection: ConnectionDecl) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        let value = toml::from_str(input)?;
        Ok(value)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = with_err_context(std::fs::read_to_string(path), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })?;
        with_err_context(Self::from_toml(&input), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })
    }
}
