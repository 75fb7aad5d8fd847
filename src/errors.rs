//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`RenderError`] covers the failure modes that can be
//! reported to a caller:
//! - Shader compilation, program linking and prefix template errors
//! - Device object creation failures
//! - Invalid cameras and missing resources
//!
//! Most of these are recoverable during a frame: [`Renderer::render`] logs them
//! and skips the affected draw. Construction-time APIs return them.
//!
//! [`Renderer::render`]: crate::renderer::Renderer::render

use thiserror::Error;

use crate::renderer::device::ShaderStage;

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Program Errors
    // ========================================================================
    /// A shader stage failed to compile. `log` holds the driver info log.
    #[error("Shader compile error ({stage:?}): {log}")]
    ShaderCompile {
        /// Which stage failed
        stage: ShaderStage,
        /// Driver info log
        log: String,
    },

    /// A program failed to link.
    #[error("Program link error: {0}")]
    ProgramLink(String),

    /// The shader prefix template failed to render.
    #[error("Shader template error: {0}")]
    ShaderTemplate(#[from] minijinja::Error),

    /// The shader library has no entry for the requested id.
    #[error("Unknown shader id: {0}")]
    UnknownShader(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The device refused to create an object.
    #[error("Device resource creation failed: {0}")]
    ResourceCreation(String),

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// The handle passed as camera is missing or not a camera node.
    #[error("Invalid camera: {0}")]
    InvalidCamera(String),

    /// A handle refers to a resource that no longer exists.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
