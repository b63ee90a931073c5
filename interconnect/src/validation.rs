//! Generic container for validation results.

use std::fmt::Display;

use crate::log::Log;

/// The output of a validator.
///
/// Infos and warnings are only logged; any error aborts resolution
/// of the assembly being validated.
#[derive(Debug)]
pub struct ValidatorOutput<I, W, E, D> {
    pub(crate) infos: Vec<I>,
    pub(crate) warnings: Vec<W>,
    pub(crate) errors: Vec<E>,
    /// Additional validation data.
    pub(crate) data: D,
}

/// Dummy struct for infos, warnings, or data that a validator never produces.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct Empty;

impl Log for Empty {
    fn log(&self) {}
}

impl<I, W, E, D> Default for ValidatorOutput<I, W, E, D>
where
    D: Default,
{
    fn default() -> Self {
        Self {
            infos: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            data: D::default(),
        }
    }
}

impl<I, W, E, D> ValidatorOutput<I, W, E, D>
where
    I: Log,
    W: Log,
    E: Display,
    D: Log + Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs all stored info, warning, and error messages.
    pub fn log(&self) {
        use crate::log::error;

        self.data.log();

        for info in self.infos.iter() {
            info.log();
        }
        for warning in self.warnings.iter() {
            warning.log();
        }
        for err in self.errors.iter() {
            error!("{err}");
        }
    }

    /// Returns `true` if any errors were encountered.
    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[inline]
    pub fn infos(&self) -> &[I] {
        &self.infos
    }

    #[inline]
    pub fn warnings(&self) -> &[W] {
        &self.warnings
    }

    #[inline]
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Consumes the output, returning the first error encountered, if any.
    pub fn into_first_error(self) -> Option<E> {
        self.errors.into_iter().next()
    }
}
