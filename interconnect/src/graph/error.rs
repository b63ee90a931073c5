//! Structural errors in an assembly graph.

use thiserror::Error;

use super::Endpoint;
use crate::deps::arcstr::ArcStr;
use crate::protocol::Role;

/// An error in the shape of an assembly: missing or conflicting bindings.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum StructuralError {
    #[error("duplicate instance name `{0}`")]
    DuplicateInstance(ArcStr),

    #[error("duplicate connection name `{0}`")]
    DuplicateConnection(ArcStr),

    #[error("duplicate port `{port}` on `{owner}`")]
    DuplicatePort { owner: ArcStr, port: ArcStr },

    #[error("connection {connection}: no such instance `{instance}`")]
    NoSuchInstance { connection: ArcStr, instance: ArcStr },

    #[error("connection {connection}: no such port `{endpoint}`")]
    NoSuchPort {
        connection: ArcStr,
        endpoint: Endpoint,
    },

    #[error("connection {connection} has no {role} attachment")]
    MissingAttachment { connection: ArcStr, role: Role },

    #[error("connection {connection} has no attachments")]
    EmptyConnection { connection: ArcStr },

    #[error(
        "connection {connection}: index {index} of {endpoint} is already bound to connection {existing}"
    )]
    IndexOccupied {
        connection: ArcStr,
        endpoint: Endpoint,
        index: usize,
        existing: ArcStr,
    },

    #[error(
        "connection {connection}: {endpoint} is not an array port and is already bound to connection {existing}"
    )]
    RebindScalar {
        connection: ArcStr,
        endpoint: Endpoint,
        existing: ArcStr,
    },

    #[error(
        "connection {connection}: elements {index}..{} of {endpoint} are out of bounds for an array of {array_count}",
        .index + .count
    )]
    IndexOutOfBounds {
        connection: ArcStr,
        endpoint: Endpoint,
        index: usize,
        count: usize,
        array_count: usize,
    },

    #[error(
        "connection {connection}: {endpoint} binds {count} element(s), but the connection carries {expected}"
    )]
    CountMismatch {
        connection: ArcStr,
        endpoint: Endpoint,
        count: usize,
        expected: usize,
    },

    #[error("port `{port}` of `{owner}` has data width {data_width}, which is not a multiple of byte width {byte_width}")]
    InvalidWidth {
        owner: ArcStr,
        port: ArcStr,
        data_width: usize,
        byte_width: usize,
    },

    #[error("port `{port}` of `{owner}` has an array count of zero")]
    EmptyArray { owner: ArcStr, port: ArcStr },
}
