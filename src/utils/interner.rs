//! Global String Interner
//!
//! Maps strings to compact integer [`Symbol`]s. Shader define sets are stored
//! as symbol pairs so that comparing and hashing them never touches the text.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns `s`, returning the existing symbol if it was seen before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up the symbol of an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the define names emitted for built-in materials so the first
/// frame does not pay for them on the hot path.
pub fn preload_common_defines() {
    let common = [
        "USE_MAP",
        "USE_ENVMAP",
        "USE_LIGHTMAP",
        "USE_BUMPMAP",
        "USE_NORMALMAP",
        "USE_SPECULARMAP",
        "USE_COLOR",
        "USE_SKINNING",
        "USE_MORPHTARGETS",
        "USE_MORPHNORMALS",
        "USE_FOG",
        "FOG_EXP2",
        "USE_SHADOWMAP",
        "DOUBLE_SIDED",
        "FLIP_SIDED",
        "1",
    ];

    for name in common {
        intern(name);
    }
}
