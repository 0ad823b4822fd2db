// renderer/framebuffer.rs
// Offscreen render target: a color texture (2D or cube) plus an optional
// depth texture.
use log::debug;

use crate::gpu::{
    CubeFace, FramebufferAttachment, FramebufferId, GpuDevice, Rect, TextureFormat, TextureTarget,
};

use super::context::RenderingContext;
use super::resource::GpuResource;
use super::texture::Texture;

#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    color: Texture,
    depth: Option<Texture>,
    /// Cube face currently attached as color target.
    face: Option<CubeFace>,
    resource: GpuResource<FramebufferId>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, with_depth: bool) -> Self {
        Self {
            width,
            height,
            color: Texture::attachment(width, height, TextureFormat::Rgba8),
            depth: with_depth.then(|| Texture::attachment(width, height, TextureFormat::Depth24)),
            face: None,
            resource: GpuResource::new(),
        }
    }

    /// Depth-only target, as used by shadow map splits.
    pub fn shadow_map(size: u32) -> Self {
        Self::new(size, size, true)
    }

    /// Point light shadow map: light distance packed into a color cube map,
    /// rendered one face at a time over a shared depth buffer.
    pub fn cube_shadow_map(size: u32) -> Self {
        Self {
            color: Texture::cube_attachment(size, TextureFormat::Rgba8),
            ..Self::new(size, size, true)
        }
    }

    pub fn is_cube(&self) -> bool {
        self.color.target() == TextureTarget::CubeMap
    }

    pub fn id(&self) -> Option<FramebufferId> {
        self.resource.id()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn color_texture(&mut self) -> &mut Texture {
        &mut self.color
    }

    pub fn depth_texture(&mut self) -> Option<&mut Texture> {
        self.depth.as_mut()
    }

    /// What lit passes sample: the depth texture, or the distance cube map.
    pub fn shadow_texture(&mut self) -> Option<&mut Texture> {
        if self.is_cube() {
            Some(&mut self.color)
        } else {
            self.depth.as_mut()
        }
    }

    pub fn cube_face(&self) -> Option<CubeFace> {
        self.face
    }

    /// Attaches `face` of the color cube map. The framebuffer must be ready
    /// and bound.
    pub fn set_cube_face<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        face: CubeFace,
    ) -> bool {
        debug_assert!(self.is_cube());
        let (Some(id), Some(color)) = (self.resource.id(), self.color.id()) else {
            return false;
        };
        debug_assert_eq!(context.framebuffer(), Some(id));
        if self.face == Some(face) {
            return true;
        }
        context.device_mut().framebuffer_texture(
            FramebufferAttachment::Color0,
            TextureTarget::CubeMapFace(face),
            color,
        );
        context.check_gpu_error("cube face attachment");
        self.face = Some(face);
        true
    }

    /// Allocates attachments and the framebuffer object on first call. The
    /// previously bound framebuffer is restored afterwards.
    pub fn is_ready<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> bool {
        if self.resource.is_ready() {
            return true;
        }
        if self.resource.has_failed() {
            return false;
        }

        if !self.color.is_ready(context) {
            return false;
        }
        if let Some(depth) = self.depth.as_mut() {
            if !depth.is_ready(context) {
                return false;
            }
        }

        let previous = context.framebuffer();
        let id = context.device_mut().create_framebuffer();
        context.bind_framebuffer_id(Some(id));
        if let Some(color) = self.color.id() {
            let (target, face) = if self.is_cube() {
                let face = CubeFace::PositiveX;
                (TextureTarget::CubeMapFace(face), Some(face))
            } else {
                (TextureTarget::Texture2D, None)
            };
            context
                .device_mut()
                .framebuffer_texture(FramebufferAttachment::Color0, target, color);
            self.face = face;
        }
        if let Some(depth) = self.depth.as_ref().and_then(Texture::id) {
            context.device_mut().framebuffer_texture(
                FramebufferAttachment::Depth,
                TextureTarget::Texture2D,
                depth,
            );
        }
        context.bind_framebuffer_id(previous);
        context.check_gpu_error("framebuffer allocation");

        self.resource.set_ready(id);
        debug!("Allocated framebuffer {:?} ({}x{})", id, self.width, self.height);
        true
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.face = None;
        self.resource.invalidate(context);
        self.color.invalidate(context);
        if let Some(depth) = self.depth.as_mut() {
            depth.invalidate(context);
        }
    }

    pub fn forget(&mut self) {
        self.face = None;
        self.resource.forget();
        self.color.forget();
        if let Some(depth) = self.depth.as_mut() {
            depth.forget();
        }
    }
}
