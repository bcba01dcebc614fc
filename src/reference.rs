//! Secure reference provider
//!
//! Converts absolute file paths into opaque `content://` handles that other
//! applications can read without seeing the filesystem layout. Only paths
//! under a declared root are accepted; the host shell must declare the same
//! roots in its own provider configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::error::ReferenceError;
use crate::types::{Access, SecureReference};

/// A named directory the provider is allowed to expose
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRoot {
    pub name: String,
    pub path: PathBuf,
}

impl ProviderRoot {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Issues secure references for files under declared roots
#[derive(Clone, Debug)]
pub struct ReferenceProvider {
    authority: String,
    roots: Vec<ProviderRoot>,
}

impl ReferenceProvider {
    pub fn new(authority: impl Into<String>, roots: Vec<ProviderRoot>) -> Self {
        Self {
            authority: authority.into(),
            roots,
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn roots(&self) -> &[ProviderRoot] {
        &self.roots
    }

    /// Build a reference for `path`. The file must exist (symlinks and `..` are
    /// resolved before the containment check) and lie under a declared root.
    pub fn reference_for(&self, path: &Path) -> Result<SecureReference, ReferenceError> {
        if !path.is_absolute() {
            return Err(ReferenceError::NotAbsolute(path.to_path_buf()));
        }

        let canonical = dunce::canonicalize(path).map_err(|e| ReferenceError::Unresolvable {
            path: path.to_path_buf(),
            source: e,
        })?;

        for root in &self.roots {
            // Roots that don't exist yet cannot contain anything
            let Ok(root_path) = dunce::canonicalize(&root.path) else {
                continue;
            };
            if let Ok(relative) = canonical.strip_prefix(&root_path) {
                let handle = self.handle_for(&root.name, relative);
                tracing::debug!("[Reference] {:?} -> {}", canonical, handle);
                return Ok(SecureReference {
                    handle,
                    path: canonical,
                    granted_to: BTreeSet::new(),
                    access: Access::Read,
                });
            }
        }

        tracing::warn!("[Reference] Rejected path outside declared roots: {:?}", canonical);
        Err(ReferenceError::OutsideRoots(canonical))
    }

    /// `content://<authority>/<root>/<seg>/<seg>` with each segment percent-encoded
    fn handle_for(&self, root_name: &str, relative: &Path) -> String {
        let mut handle = format!(
            "content://{}/{}",
            self.authority,
            urlencoding::encode(root_name)
        );
        for component in relative.components() {
            if let Component::Normal(segment) = component {
                handle.push('/');
                handle.push_str(&urlencoding::encode(&segment.to_string_lossy()));
            }
        }
        handle
    }

    /// Record a read grant on the reference. The host applies the actual permission.
    pub fn record_grant(reference: &mut SecureReference, package: &str) {
        reference.granted_to.insert(package.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (ReferenceProvider, TempDir) {
        let temp = TempDir::new().unwrap();
        let share = temp.path().join("temp_share");
        fs::create_dir_all(share.join("req-1-abc")).unwrap();
        fs::write(share.join("req-1-abc").join("Invoice 7.pdf"), b"%PDF").unwrap();
        fs::write(temp.path().join("secret.txt"), b"nope").unwrap();
        let provider = ReferenceProvider::new(
            "com.rcm.erp.provider",
            vec![
                ProviderRoot::new("temp_share", share),
                ProviderRoot::new("missing", temp.path().join("not-created")),
            ],
        );
        (provider, temp)
    }

    #[test]
    fn test_reference_inside_root() {
        let (provider, temp) = setup();
        let path = temp.path().join("temp_share/req-1-abc/Invoice 7.pdf");
        let reference = provider.reference_for(&path).unwrap();
        assert_eq!(
            reference.handle,
            "content://com.rcm.erp.provider/temp_share/req-1-abc/Invoice%207.pdf"
        );
        assert_eq!(reference.access, Access::Read);
        assert!(reference.granted_to.is_empty());
    }

    #[test]
    fn test_rejects_outside_and_traversal() {
        let (provider, temp) = setup();
        assert!(matches!(
            provider.reference_for(&temp.path().join("secret.txt")),
            Err(ReferenceError::OutsideRoots(_))
        ));
        assert!(matches!(
            provider.reference_for(&temp.path().join("temp_share/../secret.txt")),
            Err(ReferenceError::OutsideRoots(_))
        ));
    }

    #[test]
    fn test_rejects_relative_and_missing() {
        let (provider, temp) = setup();
        assert!(matches!(
            provider.reference_for(Path::new("temp_share/x.pdf")),
            Err(ReferenceError::NotAbsolute(_))
        ));
        assert!(matches!(
            provider.reference_for(&temp.path().join("temp_share/ghost.pdf")),
            Err(ReferenceError::Unresolvable { .. })
        ));
    }

    #[test]
    fn test_record_grant() {
        let (provider, temp) = setup();
        let mut reference = provider
            .reference_for(&temp.path().join("temp_share/req-1-abc/Invoice 7.pdf"))
            .unwrap();
        ReferenceProvider::record_grant(&mut reference, "com.whatsapp");
        assert!(reference.is_granted_to("com.whatsapp"));
        assert!(!reference.is_granted_to("com.whatsapp.w4b"));
    }
}
