//! Save partials for a build, merge them into one document, publish, clean.

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::model::{
    Artifact, BuildInfo, BuildRecord, BuildRunKey, Dependency, Module, ModuleIdentity, Partial,
    BUILD_INFO_VERSION,
};
use crate::remote::BuildInfoPublisher;
use crate::store::PartialStore;

/// Merge partials into a build-info document.
///
/// Partials sharing a module id contribute to one module: artifact and
/// dependency lists are concatenated in partial order, and the module keeps
/// the type and position of its first partial.
pub fn merge_partials(record: &BuildRecord, partials: &[Partial]) -> BuildInfo {
    let mut modules: Vec<Module> = Vec::new();
    for partial in partials {
        let module = match modules.iter().position(|m| m.id == partial.module_id) {
            Some(idx) => modules.get_mut(idx),
            None => {
                modules.push(Module::empty(&ModuleIdentity::new(
                    &partial.module_id,
                    partial.module_type,
                )));
                modules.last_mut()
            }
        };
        let Some(module) = module else {
            continue;
        };
        if module.module_type != partial.module_type {
            debug!(
                module = %module.id,
                kept = %module.module_type,
                ignored = %partial.module_type,
                "module type differs across partials"
            );
        }
        if let Some(artifacts) = &partial.artifacts {
            module.artifacts.extend(artifacts.iter().cloned());
        }
        if let Some(dependencies) = &partial.dependencies {
            module.dependencies.extend(dependencies.iter().cloned());
        }
    }

    BuildInfo {
        version: BUILD_INFO_VERSION.to_owned(),
        name: record.name.clone(),
        number: record.number.clone(),
        project: record.project.clone(),
        started_ms: record.started_ms,
        modules,
    }
}

/// Records partial build-info across pipeline steps and aggregates it.
#[derive(Debug)]
pub struct BuildInfoManager<S> {
    store: S,
}

impl<S: PartialStore> BuildInfoManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist artifacts for `module` as a new partial.
    /// Does nothing for an untracked key.
    ///
    /// # Errors
    /// Returns an error if the partial cannot be persisted.
    pub fn save_artifacts(
        &self,
        key: &BuildRunKey,
        module: &ModuleIdentity,
        artifacts: Vec<Artifact>,
    ) -> Result<(), EngineError> {
        if !key.is_tracked() {
            debug!("build name or number not set; artifacts not recorded");
            return Ok(());
        }
        let count = artifacts.len();
        self.store.append(key, &Partial::artifacts(module, artifacts))?;
        info!("recorded {count} artifact(s) for {key} (module: {})", module.id);
        Ok(())
    }

    /// Persist dependencies for `module` as a new partial.
    /// Does nothing for an untracked key.
    ///
    /// # Errors
    /// Returns an error if the partial cannot be persisted.
    pub fn save_dependencies(
        &self,
        key: &BuildRunKey,
        module: &ModuleIdentity,
        dependencies: Vec<Dependency>,
    ) -> Result<(), EngineError> {
        if !key.is_tracked() {
            debug!("build name or number not set; dependencies not recorded");
            return Ok(());
        }
        let count = dependencies.len();
        self.store
            .append(key, &Partial::dependencies(module, dependencies))?;
        info!("recorded {count} dependency(ies) for {key} (module: {})", module.id);
        Ok(())
    }

    /// Merge every partial saved under `key`. Reading leaves the partials intact.
    ///
    /// # Errors
    /// Returns `EngineError::UntrackedBuild` if name or number is empty, or an
    /// error if stored partials cannot be read.
    pub fn aggregate(&self, key: &BuildRunKey) -> Result<BuildInfo, EngineError> {
        key.require_tracked("aggregate build info")?;
        let info = match self.store.load(key)? {
            Some(stored) => merge_partials(&stored.record, &stored.partials),
            None => merge_partials(&BuildRecord::new(key, 0), &[]),
        };
        debug!(build = %key, modules = info.modules.len(), "aggregated build info");
        Ok(info)
    }

    /// Aggregate, publish tagged with the key's project, then optionally clean.
    ///
    /// A clean failure after a successful publish is logged, not returned.
    ///
    /// # Errors
    /// Returns an error if aggregation or publishing fails.
    pub fn publish_aggregated(
        &self,
        key: &BuildRunKey,
        publisher: &dyn BuildInfoPublisher,
        cleanup: bool,
    ) -> Result<BuildInfo, EngineError> {
        let info = self.aggregate(key)?;
        publisher.publish(&info, &key.project)?;
        info!("published build info for {key} ({} module(s))", info.modules.len());

        if cleanup {
            if let Err(e) = self.clean(key) {
                warn!("failed to clean build-info cache for {key}: {e}");
            }
        }
        Ok(info)
    }

    /// Delete every partial saved under `key`. Idempotent; untracked keys are a no-op.
    ///
    /// # Errors
    /// Returns an error if stored partials exist but cannot be removed.
    pub fn clean(&self, key: &BuildRunKey) -> Result<(), EngineError> {
        if !key.is_tracked() {
            return Ok(());
        }
        self.store.delete(key)?;
        debug!(build = %key, "cleaned build-info cache");
        Ok(())
    }
}
