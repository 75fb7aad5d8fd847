//! Shader programs: library lookup, parameter keys, source assembly and the
//! reference-counted program cache.

pub mod cache;
pub mod library;
pub mod parameters;
pub mod source;

pub use cache::{Program, ProgramCache, ProgramDescriptor, ProgramHandle};
pub use library::{ShaderLibrary, ShaderSource};
pub use parameters::{ParameterContext, ProgramParameters};
