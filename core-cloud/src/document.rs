//! Remote document model.
//!
//! A [`RemoteDocument`] is a file or folder node in a provider's namespace,
//! keyed by its slash-delimited path within the account. Folders may be
//! "virtual": implied prefixes of file paths with no backing object of their
//! own, synthesized on demand from a path string. Documents are never cached
//! beyond the call that produced them; every query re-derives current state.

use crate::APP_FOLDER_NAME;

/// Strip leading and trailing `/` from a path.
///
/// Every path is normalized this way before being used as a key or sent to a
/// provider.
pub fn trim_slashes(path: &str) -> &str {
    path.trim_matches('/')
}

/// Last path segment; empty for the root.
pub fn name_from_path(path: &str) -> &str {
    let path = trim_slashes(path);
    match path.rsplit_once('/') {
        Some((_, name)) => name,
        None => path,
    }
}

/// Everything before the last segment; empty for top-level paths.
pub fn parent_path(path: &str) -> &str {
    let path = trim_slashes(path);
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// A file or folder node in a provider's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Owning account name
    pub account_name: String,
    /// Slash-delimited path, no leading/trailing separator
    pub path: String,
    /// Display name: the last path segment (empty for the root)
    pub name: String,
    /// Whether this node is a folder (structural or virtual)
    pub is_folder: bool,
    /// Size in bytes (0 for folders)
    pub size: u64,
    /// Modification time as epoch milliseconds, when the provider reports one
    pub modified_at: Option<i64>,
    /// Provider-opaque version/identity token for conditional operations
    pub version: Option<String>,
}

impl RemoteDocument {
    /// A file node parsed from a provider listing or metadata response.
    pub fn file(
        account_name: impl Into<String>,
        path: &str,
        size: u64,
        modified_at: Option<i64>,
        version: Option<String>,
    ) -> Self {
        let path = trim_slashes(path).to_string();
        let name = name_from_path(&path).to_string();
        Self {
            account_name: account_name.into(),
            path,
            name,
            is_folder: false,
            size,
            modified_at,
            version,
        }
    }

    /// A folder synthesized from a path string alone.
    ///
    /// Virtual folders have no backing object; their existence is determined
    /// elsewhere (marker entry or implied prefix).
    pub fn virtual_folder(account_name: impl Into<String>, path: &str) -> Self {
        let path = trim_slashes(path).to_string();
        let name = name_from_path(&path).to_string();
        Self {
            account_name: account_name.into(),
            path,
            name,
            is_folder: true,
            size: 0,
            modified_at: None,
            version: None,
        }
    }

    /// The account's root folder: empty path, empty name.
    pub fn root_folder(account_name: impl Into<String>) -> Self {
        Self::virtual_folder(account_name, "")
    }

    /// The fixed application folder used as the synchronization root.
    pub fn app_folder(account_name: impl Into<String>) -> Self {
        Self::virtual_folder(account_name, APP_FOLDER_NAME)
    }

    /// Path of the containing folder.
    pub fn parent_path(&self) -> &str {
        parent_path(&self.path)
    }

    /// Path of a child entry under this folder.
    pub fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}
