//! Fragment store: one config file per listener owner.
//!
//! The proxy has no include directive, so each owner's `listen` block lives
//! in `<dir>/<owner>.cfg` and the reload coordinator concatenates them.
//! Files with any other extension are ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use fleet_core::{FleetError, FleetResult};

/// Only files with this extension take part in the merge.
pub const FRAGMENT_EXTENSION: &str = "cfg";

/// One owner's block of proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFragment {
    pub owner: String,
    pub text: String,
}

impl ConfigFragment {
    pub fn new(owner: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            text: text.into(),
        }
    }
}

/// Directory-backed set of fragments, at most one per owner.
#[derive(Debug, Clone)]
pub struct FragmentStore {
    dir: PathBuf,
}

impl FragmentStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> FleetResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| FleetError::write(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert or replace the owner's fragment.
    pub fn put(&self, fragment: &ConfigFragment) -> FleetResult<()> {
        let path = self.path_for(&fragment.owner)?;
        write_atomic(&path, fragment.text.as_bytes())?;
        debug!(owner = %fragment.owner, "fragment stored");
        Ok(())
    }

    pub fn get(&self, owner: &str) -> FleetResult<Option<ConfigFragment>> {
        let path = self.path_for(owner)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(ConfigFragment::new(owner, text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FleetError::read(path, e)),
        }
    }

    /// Delete the owner's fragment. Returns true if it existed.
    pub fn remove(&self, owner: &str) -> FleetResult<bool> {
        let path = self.path_for(owner)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%owner, "fragment removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FleetError::write(path, e)),
        }
    }

    /// Every fragment, sorted by owner name.
    pub fn list_all(&self) -> FleetResult<Vec<ConfigFragment>> {
        let mut fragments = Vec::new();
        for owner in self.owners()? {
            let path = self.path_for(&owner)?;
            let text = fs::read_to_string(&path).map_err(|e| FleetError::read(&path, e))?;
            fragments.push(ConfigFragment::new(owner, text));
        }
        Ok(fragments)
    }

    /// Owner names with a fragment on disk, sorted.
    pub fn owners(&self) -> FleetResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| FleetError::read(&self.dir, e))?;
        let mut owners = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FleetError::read(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAGMENT_EXTENSION) {
                continue;
            }
            if let Some(owner) = path.file_stem().and_then(|s| s.to_str())
                && validate_owner(owner).is_ok()
                && path.is_file()
            {
                owners.push(owner.to_string());
            }
        }
        owners.sort();
        Ok(owners)
    }

    /// Delete every fragment. Returns how many were removed.
    pub fn clear(&self) -> FleetResult<usize> {
        let owners = self.owners()?;
        for owner in &owners {
            self.remove(owner)?;
        }
        Ok(owners.len())
    }

    fn path_for(&self, owner: &str) -> FleetResult<PathBuf> {
        validate_owner(owner)?;
        Ok(self.dir.join(format!("{owner}.{FRAGMENT_EXTENSION}")))
    }
}

/// Owner names become file names, so they must be a single path component.
pub fn validate_owner(owner: &str) -> FleetResult<()> {
    let bad = owner.is_empty()
        || owner.starts_with('.')
        || owner.contains(['/', '\\', '\0'])
        || owner.chars().any(char::is_whitespace);
    if bad {
        return Err(FleetError::InvalidConfig(format!(
            "invalid fragment owner {owner:?}"
        )));
    }
    Ok(())
}

/// Write `contents` to a hidden sibling and rename it over `path`.
///
/// Readers see either the old file or the new one, never a prefix.
pub fn write_atomic(path: &Path, contents: &[u8]) -> FleetResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FleetError::InvalidConfig(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, contents).map_err(|e| FleetError::write(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(FleetError::write(path, e));
    }
    Ok(())
}
