//! Reload coordinator: merges fragments into the effective config and
//! asks the proxy to pick it up.
//!
//! The merged file is always rewritten in full and swapped in with a
//! rename, and reload is only signalled once that write has succeeded.
//! Callers must serialise calls; the coordinator reads the whole fragment
//! set and writes a single file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fleet_core::{FleetError, FleetResult};

use crate::control::ProxyControl;
use crate::fragments::{write_atomic, ConfigFragment, FragmentStore};

pub struct ReloadCoordinator {
    store: FragmentStore,
    base_path: PathBuf,
    main_path: PathBuf,
    control: Arc<dyn ProxyControl>,
}

impl ReloadCoordinator {
    pub fn new(
        store: FragmentStore,
        base_path: impl Into<PathBuf>,
        main_path: impl Into<PathBuf>,
        control: Arc<dyn ProxyControl>,
    ) -> Self {
        Self {
            store,
            base_path: base_path.into(),
            main_path: main_path.into(),
            control,
        }
    }

    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn control(&self) -> &Arc<dyn ProxyControl> {
        &self.control
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    /// Build the effective config from the base file and every fragment.
    pub fn compose(&self) -> FleetResult<String> {
        let base =
            fs::read_to_string(&self.base_path).map_err(|e| FleetError::read(&self.base_path, e))?;
        let fragments = self.store.list_all()?;
        Ok(merge(&base, &fragments))
    }

    /// Rewrite the effective config without touching the running proxy.
    pub fn write_effective(&self) -> FleetResult<String> {
        let merged = self.compose()?;
        write_atomic(&self.main_path, merged.as_bytes())?;
        Ok(merged)
    }

    /// Rewrite the effective config, then reload the proxy.
    ///
    /// A reload failure is returned as-is; the proxy keeps serving its
    /// previous configuration in that case.
    pub async fn regenerate(&self) -> FleetResult<()> {
        let merged = self.write_effective()?;
        if let Err(e) = self.control.reload().await {
            warn!(path = %self.main_path.display(), error = %e, "proxy rejected regenerated config");
            return Err(e);
        }
        info!(
            path = %self.main_path.display(),
            bytes = merged.len(),
            "proxy config regenerated"
        );
        Ok(())
    }
}

/// Base text followed by each fragment, each set off by a blank line.
///
/// `fragments` must already be in merge order.
pub fn merge(base: &str, fragments: &[ConfigFragment]) -> String {
    let mut out = String::with_capacity(
        base.len() + fragments.iter().map(|f| f.text.len() + 2).sum::<usize>(),
    );
    out.push_str(base);
    for fragment in fragments {
        out.push('\n');
        out.push_str(&fragment.text);
        if !fragment.text.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
