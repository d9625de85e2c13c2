//! Offscreen render targets for the reconstruction passes.
//!
//! The pipeline renders into four sampled textures through five framebuffers.
//! They are always created and destroyed together by [`OffscreenTargets`], so a
//! resize can never leave a subset at the old size. Slots are addressed by the
//! [`TextureSlot`] and [`FramebufferSlot`] enums rather than by field, which
//! keeps the batch a plain ordered collection.
//!
//! # Wiring
//!
//! ```text
//! Framebuffer      writes texture     notes
//! Depth            Depth              + Depth32Float z-buffer for nearest-surface test
//! DepthBlurH       BlurScratch        horizontal depth blur
//! DepthBlurV       Depth              vertical depth blur, back into Depth
//! Thickness        Thickness          additive particle accumulation
//! ThicknessBlur    ThicknessBlur      horizontal thickness blur
//! ```
//!
//! The vertical thickness blur writes back through the `Thickness` framebuffer,
//! so after a frame `Depth` and `Thickness` hold the smoothed images the
//! composite reads.
//!
//! # Clear values
//!
//! Every framebuffer clears its color to zero when a pass begins. Zero depth is
//! the "no coverage" sentinel (visible particle surfaces have positive view
//! distance) and zero thickness means no fluid.

use crate::error::SurfaceError;
use crate::gpu::GpuContext;

/// Linear view-space depth, written without blending.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Accumulated thickness. R16Float is blendable without optional features.
pub const THICKNESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;
/// Hardware depth buffer used only while splatting particle depth.
pub const Z_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// The four sampled textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Depth = 0,
    BlurScratch = 1,
    Thickness = 2,
    ThicknessBlur = 3,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 4] = [
        TextureSlot::Depth,
        TextureSlot::BlurScratch,
        TextureSlot::Thickness,
        TextureSlot::ThicknessBlur,
    ];

    pub const fn format(self) -> wgpu::TextureFormat {
        match self {
            TextureSlot::Depth | TextureSlot::BlurScratch => DEPTH_FORMAT,
            TextureSlot::Thickness | TextureSlot::ThicknessBlur => THICKNESS_FORMAT,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            TextureSlot::Depth => "Particle Depth Texture",
            TextureSlot::BlurScratch => "Depth Blur Scratch Texture",
            TextureSlot::Thickness => "Thickness Texture",
            TextureSlot::ThicknessBlur => "Thickness Blur Texture",
        }
    }
}

/// The five framebuffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramebufferSlot {
    Depth = 0,
    DepthBlurH = 1,
    DepthBlurV = 2,
    Thickness = 3,
    ThicknessBlur = 4,
}

impl FramebufferSlot {
    pub const ALL: [FramebufferSlot; 5] = [
        FramebufferSlot::Depth,
        FramebufferSlot::DepthBlurH,
        FramebufferSlot::DepthBlurV,
        FramebufferSlot::Thickness,
        FramebufferSlot::ThicknessBlur,
    ];

    /// The texture this framebuffer renders into.
    pub const fn color(self) -> TextureSlot {
        match self {
            FramebufferSlot::Depth | FramebufferSlot::DepthBlurV => TextureSlot::Depth,
            FramebufferSlot::DepthBlurH => TextureSlot::BlurScratch,
            FramebufferSlot::Thickness => TextureSlot::Thickness,
            FramebufferSlot::ThicknessBlur => TextureSlot::ThicknessBlur,
        }
    }

    /// Whether the framebuffer carries a z-buffer.
    pub const fn depth_tested(self) -> bool {
        matches!(self, FramebufferSlot::Depth)
    }

    pub const fn label(self) -> &'static str {
        match self {
            FramebufferSlot::Depth => "Particle Depth Framebuffer",
            FramebufferSlot::DepthBlurH => "Horizontal Depth Blur Framebuffer",
            FramebufferSlot::DepthBlurV => "Vertical Depth Blur Framebuffer",
            FramebufferSlot::Thickness => "Thickness Framebuffer",
            FramebufferSlot::ThicknessBlur => "Thickness Blur Framebuffer",
        }
    }
}

/// A set of attachments a pass renders into.
pub struct Framebuffer {
    slot: FramebufferSlot,
    color: wgpu::TextureView,
    z_buffer: Option<wgpu::TextureView>,
    width: u32,
    height: u32,
}

impl Framebuffer {
    pub fn slot(&self) -> FramebufferSlot {
        self.slot
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// View of the color texture, for sampling in a later pass.
    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color
    }

    /// Begin a render pass that clears every attachment.
    ///
    /// Color clears to zero (the background sentinel), the z-buffer to the far
    /// plane.
    pub fn begin<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.slot.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: self.z_buffer.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}

/// All offscreen textures and framebuffers at one resolution.
pub struct OffscreenTargets {
    textures: Vec<wgpu::Texture>,
    views: Vec<wgpu::TextureView>,
    z_buffer: wgpu::Texture,
    framebuffers: Vec<Framebuffer>,
    width: u32,
    height: u32,
}

impl OffscreenTargets {
    /// Allocate every texture and framebuffer at `width x height`.
    ///
    /// Either the whole batch is created or an error is returned and nothing
    /// is kept.
    pub fn create_all(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, SurfaceError> {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let created = gpu.scoped(|device| {
            let textures: Vec<wgpu::Texture> = TextureSlot::ALL
                .iter()
                .map(|slot| {
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(slot.label()),
                        size,
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: slot.format(),
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                            | wgpu::TextureUsages::TEXTURE_BINDING
                            | wgpu::TextureUsages::COPY_SRC
                            | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    })
                })
                .collect();

            let z_buffer = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Particle Depth Z-Buffer"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Z_BUFFER_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });

            (textures, z_buffer)
        });

        let (textures, z_buffer) = created.map_err(|message| SurfaceError::ResourceAllocation {
            label: format!("offscreen targets {width}x{height}"),
            message,
        })?;

        let view_desc = wgpu::TextureViewDescriptor::default();
        let views: Vec<wgpu::TextureView> =
            textures.iter().map(|t| t.create_view(&view_desc)).collect();
        let z_view = z_buffer.create_view(&view_desc);

        let framebuffers = FramebufferSlot::ALL
            .iter()
            .map(|&slot| Framebuffer {
                slot,
                color: views[slot.color() as usize].clone(),
                z_buffer: slot.depth_tested().then(|| z_view.clone()),
                width,
                height,
            })
            .collect();

        log::debug!("allocated offscreen targets at {width}x{height}");

        Ok(Self {
            textures,
            views,
            z_buffer,
            framebuffers,
            width,
            height,
        })
    }

    /// Release every texture immediately instead of waiting for drop.
    pub fn destroy_all(self) {
        for texture in &self.textures {
            texture.destroy();
        }
        self.z_buffer.destroy();
        log::debug!(
            "destroyed offscreen targets at {}x{}",
            self.width,
            self.height
        );
    }

    pub fn texture(&self, slot: TextureSlot) -> &wgpu::Texture {
        &self.textures[slot as usize]
    }

    pub fn view(&self, slot: TextureSlot) -> &wgpu::TextureView {
        &self.views[slot as usize]
    }

    pub fn framebuffer(&self, slot: FramebufferSlot) -> &Framebuffer {
        &self.framebuffers[slot as usize]
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The last allocated offscreen size. Zero until the first allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffscreenExtent {
    pub width: u32,
    pub height: u32,
}

impl OffscreenExtent {
    /// Whether targets must be reallocated to render at `width x height`.
    pub fn needs_resize(&self, width: u32, height: u32) -> bool {
        self.width != width || self.height != height
    }
}

/// Owns the current [`OffscreenTargets`] and reallocates them on size change.
#[derive(Default)]
pub struct OffscreenResources {
    targets: Option<OffscreenTargets>,
    extent: OffscreenExtent,
    allocations: u64,
}

impl OffscreenResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure targets exist at exactly `width x height`.
    ///
    /// Returns `true` when a new batch was allocated. The replacement batch is
    /// fully created before the old one is destroyed, so on failure the previous
    /// targets and extent are left untouched and the next call retries.
    pub fn ensure_size(
        &mut self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<bool, SurfaceError> {
        if self.targets.is_some() && !self.extent.needs_resize(width, height) {
            return Ok(false);
        }

        let fresh = OffscreenTargets::create_all(gpu, width, height)?;
        if let Some(old) = self.targets.replace(fresh) {
            old.destroy_all();
        }
        self.extent = OffscreenExtent { width, height };
        self.allocations += 1;
        Ok(true)
    }

    pub fn targets(&self) -> Option<&OffscreenTargets> {
        self.targets.as_ref()
    }

    pub fn extent(&self) -> OffscreenExtent {
        self.extent
    }

    /// How many batches have been allocated over this instance's lifetime.
    pub fn allocation_count(&self) -> u64 {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_always_resizes() {
        let extent = OffscreenExtent::default();
        assert!(extent.needs_resize(1, 1));
        assert!(extent.needs_resize(800, 600));
    }

    #[test]
    fn any_dimension_change_resizes() {
        let extent = OffscreenExtent {
            width: 640,
            height: 480,
        };
        assert!(!extent.needs_resize(640, 480));
        assert!(extent.needs_resize(640, 481));
        assert!(extent.needs_resize(641, 480));
    }

    #[test]
    fn depth_blur_ping_pongs_through_scratch() {
        assert_eq!(FramebufferSlot::DepthBlurH.color(), TextureSlot::BlurScratch);
        assert_eq!(FramebufferSlot::DepthBlurV.color(), TextureSlot::Depth);
        assert_eq!(FramebufferSlot::Depth.color(), TextureSlot::Depth);
    }

    #[test]
    fn every_texture_has_a_framebuffer() {
        for texture in TextureSlot::ALL {
            assert!(
                FramebufferSlot::ALL.iter().any(|fb| fb.color() == texture),
                "{texture:?} is never rendered"
            );
        }
    }

    #[test]
    fn only_particle_depth_is_depth_tested() {
        let tested: Vec<_> = FramebufferSlot::ALL
            .into_iter()
            .filter(|fb| fb.depth_tested())
            .collect();
        assert_eq!(tested, vec![FramebufferSlot::Depth]);
    }

    #[test]
    fn slots_index_in_declaration_order() {
        for (i, slot) in TextureSlot::ALL.iter().enumerate() {
            assert_eq!(*slot as usize, i);
        }
        for (i, slot) in FramebufferSlot::ALL.iter().enumerate() {
            assert_eq!(*slot as usize, i);
        }
    }

    #[test]
    fn depth_and_thickness_formats_differ() {
        assert_eq!(TextureSlot::Depth.format(), wgpu::TextureFormat::R32Float);
        assert_eq!(TextureSlot::Thickness.format(), wgpu::TextureFormat::R16Float);
        assert_eq!(
            TextureSlot::BlurScratch.format(),
            TextureSlot::Depth.format()
        );
    }
}
