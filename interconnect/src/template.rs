//! The worker template cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::decl::WorkerDecl;
use crate::deps::arcstr::ArcStr;
use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::graph::worker::Worker;
use crate::log::debug;

/// Worker templates keyed by name.
///
/// Templates are either registered directly or loaded from `<name>.toml`
/// in one of the search paths the first time they are referenced.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    paths: Vec<PathBuf>,
    workers: HashMap<ArcStr, Arc<Worker>>,
}

impl TemplateCache {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            workers: HashMap::new(),
        }
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Registers a template, replacing any template with the same name.
    pub fn insert(&mut self, worker: Worker) -> Arc<Worker> {
        let worker = Arc::new(worker);
        self.workers.insert(worker.name().clone(), worker.clone());
        worker
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Returns the named template, loading it on first use.
    pub fn get(&mut self, name: &str) -> Result<Arc<Worker>> {
        if let Some(worker) = self.workers.get(name) {
            return Ok(worker.clone());
        }

        let path = self
            .paths
            .iter()
            .map(|dir| dir.join(format!("{name}.toml")))
            .find(|path| path.is_file())
            .ok_or_else(|| ErrorSource::WorkerNotFound(ArcStr::from(name)))?;

        debug!("loading worker template {name} from {path:?}");
        let ctx = || ErrorContext::LoadWorker(ArcStr::from(name));
        let decl = with_err_context(WorkerDecl::from_toml_file(&path), ctx)?;
        let worker = with_err_context(decl.into_worker(), ctx)?;
        Ok(self.insert(worker))
    }
}
