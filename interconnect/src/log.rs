//! Logging shim.
//!
//! Unit tests print straight to stdout so that resolution traces show up
//! next to failing assertions; everything else goes through the [`log`] facade.

#[cfg(test)]
#[allow(unused_imports)]
pub(crate) use std::{
    println as trace, println as debug, println as info, println as warn, println as error,
};

#[cfg(not(test))]
#[allow(unused_imports)]
pub(crate) use log::{debug, error, info, trace, warn};

/// Objects that know how to report themselves to the log.
pub trait Log {
    fn log(&self);
}
