//! Utility Module
//!
//! - [`interner`]: String interning for shader define names and values
//!
//! Interned strings (Symbols) compare and hash in O(1), which keeps program
//! cache keys cheap to compute.
//!
//! ```rust,ignore
//! use myth_gl::utils::interner;
//!
//! let sym1 = interner::intern("USE_MAP");
//! let sym2 = interner::intern("USE_MAP");
//! assert_eq!(sym1, sym2);
//! ```

pub mod interner;

pub use interner::Symbol;
