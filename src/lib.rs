//! Compiler for the NZSL shading language, targeting GLSL and SPIR-V.
pub mod compiler;

#[cfg(test)]
mod tests;
