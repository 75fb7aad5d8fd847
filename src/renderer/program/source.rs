//! Program Source Assembly
//!
//! Final stage sources are `prefix + user source`. The prefix carries the
//! precision qualifiers, `#define`s generated from [`ProgramParameters`], the
//! material's own defines and the built-in uniform / attribute declarations.
//! It is rendered from minijinja templates using the `{$ $}` block and `$$`
//! line-statement syntax.

use std::sync::OnceLock;

use minijinja::{Environment, syntax::SyntaxConfig};
use serde::Serialize;

use crate::errors::Result;
use crate::renderer::program::parameters::ProgramParameters;
use crate::resources::ShaderDefines;

static PREFIX_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> &'static Environment<'static> {
    PREFIX_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure Jinja2 syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        env.add_template("prefix_vertex", include_str!("shaders/prefix_vertex.glsl"))
            .expect("vertex prefix template must parse");
        env.add_template("prefix_fragment", include_str!("shaders/prefix_fragment.glsl"))
            .expect("fragment prefix template must parse");

        env
    })
}

#[derive(Serialize)]
struct PrefixContext<'a> {
    params: &'a ProgramParameters,
    defines: Vec<String>,
}

/// Vertex and fragment sources ready for compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSources {
    pub vertex: String,
    pub fragment: String,
}

pub fn assemble(
    parameters: &ProgramParameters,
    defines: &ShaderDefines,
    vertex: &str,
    fragment: &str,
) -> Result<AssembledSources> {
    let env = env();
    let ctx = PrefixContext {
        params: parameters,
        defines: defines.to_directives(),
    };

    let vertex_prefix = env.get_template("prefix_vertex")?.render(&ctx)?;
    let fragment_prefix = env.get_template("prefix_fragment")?.render(&ctx)?;

    Ok(AssembledSources {
        vertex: format!("{vertex_prefix}\n{vertex}"),
        fragment: format!("{fragment_prefix}\n{fragment}"),
    })
}

/// Source text with 1-based line numbers, for compile error reports.
#[must_use]
pub fn numbered_lines(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::program::parameters::FloatKey;
    use crate::renderer::settings::Precision;

    #[test]
    fn prefix_reflects_parameters_and_defines() {
        let parameters = ProgramParameters {
            precision: Precision::Mediump,
            map: true,
            max_point_lights: 3,
            morph_targets: true,
            max_morph_targets: 2,
            ..ProgramParameters::default()
        };
        let defines = ShaderDefines::from(&[("WAVES", "4")][..]);
        let sources = assemble(&parameters, &defines, "void main() {}", "void main() {}").unwrap();

        assert!(sources.vertex.starts_with("precision mediump float;"));
        assert!(sources.vertex.contains("#define WAVES 4"));
        assert!(sources.vertex.contains("#define USE_MAP"));
        assert!(sources.vertex.contains("#define MAX_POINT_LIGHTS 3"));
        assert!(sources.vertex.contains("attribute vec3 morphTarget1;"));
        assert!(!sources.vertex.contains("morphTarget2"));
        assert!(sources.fragment.ends_with("void main() {}"));
    }

    #[test]
    fn alpha_test_define_only_when_set() {
        let mut parameters = ProgramParameters::default();
        let defines = ShaderDefines::new();
        let plain = assemble(&parameters, &defines, "", "").unwrap();
        assert!(!plain.fragment.contains("ALPHATEST"));

        parameters.alpha_test = FloatKey::new(0.5);
        let tested = assemble(&parameters, &defines, "", "").unwrap();
        assert!(tested.fragment.contains("#define ALPHATEST 0.5"));
    }

    #[test]
    fn numbered_lines_are_one_based() {
        assert_eq!(numbered_lines("a\nb"), "   1: a\n   2: b");
    }
}
