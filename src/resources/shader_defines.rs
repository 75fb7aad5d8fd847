//! Shader Define Sets
//!
//! User-supplied `#define` directives for [`MaterialKind::Shader`] materials.
//! Definitions are stored as interned symbol pairs in a sorted `Vec`, so two
//! sets with the same content always hash identically and program cache keys
//! stay cheap to compute.
//!
//! ```rust,ignore
//! use myth_gl::resources::ShaderDefines;
//!
//! let mut defines = ShaderDefines::new();
//! defines.set("USE_RIM", "1");
//! defines.set("RIM_POWER", "2.0");
//! let hash = defines.compute_hash();
//! ```
//!
//! [`MaterialKind::Shader`]: crate::resources::MaterialKind::Shader

use std::hash::{Hash, Hasher};

use crate::utils::interner::{self, Symbol};

/// An ordered collection of `#define NAME VALUE` pairs.
#[derive(Debug, Clone, Default)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    /// Sets a define, replacing the value of an existing key.
    pub fn set(&mut self, key: &str, value: &str) {
        let (key, value) = (interner::intern(key), interner::intern(value));
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => self.defines[idx].1 = value,
            Err(idx) => self.defines.insert(idx, (key, value)),
        }
    }

    /// Removes a define. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(key) = interner::get(key) else {
            return false;
        };
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => {
                self.defines.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key| {
            self.defines
                .binary_search_by_key(&key, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterates `(name, value)` pairs as strings.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Renders the set as GLSL `#define` lines.
    #[must_use]
    pub fn to_directives(&self) -> Vec<String> {
        self.iter()
            .map(|(k, v)| format!("#define {k} {v}"))
            .collect()
    }

    /// Content hash used as part of the program cache key.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderDefines {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderDefines {}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut set = Self::new();
        for (name, value) in defines {
            set.set(name, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_remove() {
        let mut defines = ShaderDefines::new();
        defines.set("USE_RIM", "1");
        defines.set("RIM_POWER", "2.0");

        assert!(defines.contains("USE_RIM"));
        assert_eq!(defines.get("RIM_POWER"), Some("2.0"));
        assert!(!defines.contains("USE_GLOW"));

        assert!(defines.remove("USE_RIM"));
        assert!(!defines.remove("USE_RIM"));
        assert_eq!(defines.len(), 1);
    }

    #[test]
    fn insertion_order_does_not_change_hash() {
        let mut d1 = ShaderDefines::new();
        d1.set("A", "1");
        d1.set("B", "2");

        let mut d2 = ShaderDefines::new();
        d2.set("B", "2");
        d2.set("A", "1");

        assert_eq!(d1, d2);
        assert_eq!(d1.compute_hash(), d2.compute_hash());
    }

    #[test]
    fn directives_render_one_line_per_define() {
        let defines = ShaderDefines::from(&[("WAVES", "4")][..]);
        assert_eq!(defines.to_directives(), vec!["#define WAVES 4".to_string()]);
    }
}
