//! Fullscreen triangle drawable.
//!
//! Programs that process every pixel of a target (blur, composite) prepend
//! [`FullscreenQuad::VERTEX_SOURCE`] to their fragment shader and draw through
//! [`FullscreenQuad::draw`]. A single oversized triangle is used instead of two,
//! which avoids the diagonal seam and needs no vertex buffer.
//!
//! The vertex stage outputs `FullscreenOut { position, uv }`, with `uv` in
//! `[0, 1]` and `v` increasing downwards so it can index textures directly.

/// Draws one triangle covering the bound viewport.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullscreenQuad;

impl FullscreenQuad {
    /// WGSL vertex stage (`vs`) shared by all fullscreen programs.
    pub const VERTEX_SOURCE: &'static str = include_str!("shaders/fullscreen.wgsl");

    pub fn new() -> Self {
        Self
    }

    /// Issue the draw. The caller binds the program beforehand.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.draw(0..3, 0..1);
    }
}
