//! Path-to-backend resolution.
//!
//! Paths may carry a `scheme://` prefix selecting a registered backend;
//! everything after the prefix is handed to the driver untouched. A path
//! without a scheme goes to the default backend.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{Error, Result};

/// Maps path schemes to backend drivers.
///
/// Resolution happens once per handle, at open time; the chosen backend is
/// immutable for the handle's lifetime.
pub struct BackendResolver {
    schemes: HashMap<String, Arc<dyn Backend>>,
    default: Arc<dyn Backend>,
}

impl BackendResolver {
    /// Create a resolver with the given default backend.
    pub fn new(default: Arc<dyn Backend>) -> Self {
        Self {
            schemes: HashMap::new(),
            default,
        }
    }

    /// Register a backend under a scheme (e.g. `mem`, `fs`).
    pub fn register(&mut self, scheme: impl Into<String>, backend: Arc<dyn Backend>) {
        self.schemes.insert(scheme.into(), backend);
    }

    /// Resolve a path to its backend and the backend-local remainder.
    ///
    /// # Errors
    /// - `InvalidPath` for an empty path, an empty remainder, or an embedded
    ///   NUL byte
    /// - `Unavailable` for an unregistered scheme
    pub fn resolve<'p>(&self, path: &'p str) -> Result<(Arc<dyn Backend>, &'p str)> {
        if path.is_empty() {
            return Err(Error::InvalidPath("empty path".into()));
        }
        if path.contains('\0') {
            return Err(Error::InvalidPath("embedded NUL byte".into()));
        }

        if let Some((scheme, rest)) = path.split_once("://") {
            if rest.is_empty() {
                return Err(Error::InvalidPath(format!("no object after scheme: {path}")));
            }
            let backend = self
                .schemes
                .get(scheme)
                .ok_or_else(|| Error::Unavailable(format!("no backend for scheme: {scheme}")))?;
            Ok((Arc::clone(backend), rest))
        } else {
            Ok((Arc::clone(&self.default), path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemBackend;

    fn resolver() -> BackendResolver {
        let mem = Arc::new(MemBackend::new());
        let mut r = BackendResolver::new(Arc::clone(&mem) as Arc<dyn Backend>);
        r.register("mem", mem);
        r
    }

    #[test]
    fn strips_scheme_prefix() {
        let r = resolver();
        let (_, rest) = r.resolve("mem://a/b.txt").unwrap();
        assert_eq!(rest, "a/b.txt");
    }

    #[test]
    fn no_scheme_goes_to_default() {
        let r = resolver();
        let (_, rest) = r.resolve("plain.txt").unwrap();
        assert_eq!(rest, "plain.txt");
    }

    #[test]
    fn rejects_unknown_scheme() {
        let r = resolver();
        let err = r.resolve("s3://bucket/key").err().unwrap();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn rejects_empty_and_nul_paths() {
        let r = resolver();
        assert!(matches!(r.resolve(""), Err(Error::InvalidPath(_))));
        assert!(matches!(r.resolve("a\0b"), Err(Error::InvalidPath(_))));
        assert!(matches!(r.resolve("mem://"), Err(Error::InvalidPath(_))));
    }
}
