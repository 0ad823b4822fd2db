// renderer/texture.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{trace, warn};
use parking_lot::Mutex;

use crate::gpu::{CubeFace, GpuDevice, TextureFormat, TextureId, TextureTarget};

use super::context::RenderingContext;
use super::resource::{GpuResource, ResourceState};

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, rgba.to_vec())
    }

    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let value = if light { 255 } else { 64 };
                pixels.extend_from_slice(&[value, value, value, 255]);
            }
        }
        Self::new(size, size, pixels)
    }
}

#[derive(Debug, Default)]
struct LoadSlot {
    ready: AtomicBool,
    image: Mutex<Option<Image>>,
}

/// Sending half of an asynchronous texture load. Move it to the loader
/// thread and call [`TextureLoader::deliver`] once the image is decoded.
#[derive(Debug)]
pub struct TextureLoader {
    slot: Arc<LoadSlot>,
}

impl TextureLoader {
    pub fn deliver(self, image: Image) {
        *self.slot.image.lock() = Some(image);
        self.slot.ready.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Pixels come from `image`, possibly after a pending load.
    Image,
    /// Storage only, used as a render target.
    Attachment { width: u32, height: u32 },
}

#[derive(Debug)]
pub struct Texture {
    target: TextureTarget,
    format: TextureFormat,
    source: Source,
    image: Option<Image>,
    pending: Option<Arc<LoadSlot>>,
    resource: GpuResource<TextureId>,
}

impl Texture {
    pub fn from_image(image: Image) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            format: TextureFormat::Rgba8,
            source: Source::Image,
            image: Some(image),
            pending: None,
            resource: GpuResource::new(),
        }
    }

    /// Texture whose pixels arrive later through the returned loader.
    pub fn pending() -> (Self, TextureLoader) {
        let slot = Arc::new(LoadSlot::default());
        let texture = Self {
            target: TextureTarget::Texture2D,
            format: TextureFormat::Rgba8,
            source: Source::Image,
            image: None,
            pending: Some(Arc::clone(&slot)),
            resource: GpuResource::new(),
        };
        (texture, TextureLoader { slot })
    }

    pub fn attachment(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            format,
            source: Source::Attachment { width, height },
            image: None,
            pending: None,
            resource: GpuResource::new(),
        }
    }

    /// Cube map render target with square `size` faces.
    pub fn cube_attachment(size: u32, format: TextureFormat) -> Self {
        Self {
            target: TextureTarget::CubeMap,
            ..Self::attachment(size, size, format)
        }
    }

    pub fn white() -> Self {
        Self::from_image(Image::solid([255, 255, 255, 255]))
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn id(&self) -> Option<TextureId> {
        self.resource.id()
    }

    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        match self.source {
            Source::Attachment { width, height } => Some((width, height)),
            Source::Image => self.image.as_ref().map(|image| (image.width, image.height)),
        }
    }

    /// Non-blocking check that the pixels have arrived.
    pub fn is_loaded(&mut self) -> bool {
        if let Some(slot) = &self.pending {
            if !slot.ready.load(Ordering::Acquire) {
                return false;
            }
            self.image = slot.image.lock().take();
            self.pending = None;
        }
        self.image.is_some() || matches!(self.source, Source::Attachment { .. })
    }

    /// Uploads on first call once loaded. A texture larger than the device
    /// supports fails permanently.
    pub fn is_ready<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> bool {
        if self.resource.is_ready() {
            return true;
        }
        if self.resource.has_failed() || !self.is_loaded() {
            return false;
        }
        let Some((width, height)) = self.size() else {
            return false;
        };

        let max = context.capabilities().max_texture_size;
        if width > max || height > max {
            warn!(
                "Texture {}x{} exceeds device limit {}; it will never be drawn",
                width, height, max
            );
            self.resource.set_failed();
            return false;
        }

        let id = context.device_mut().create_texture();
        let unit = context.active_texture_unit();
        context.bind_texture(unit, self.target, Some(id));
        let pixels = self.image.as_ref().map(|image| image.pixels.as_slice());
        if self.target == TextureTarget::CubeMap {
            for face in CubeFace::ALL {
                context.device_mut().texture_image_2d(
                    TextureTarget::CubeMapFace(face),
                    self.format,
                    width,
                    height,
                    pixels,
                );
            }
        } else {
            context
                .device_mut()
                .texture_image_2d(self.target, self.format, width, height, pixels);
        }
        context.check_gpu_error("texture upload");
        self.resource.set_ready(id);
        trace!("Uploaded texture {:?} ({}x{})", id, width, height);
        true
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.resource.invalidate(context);
    }

    pub fn forget(&mut self) {
        self.resource.forget();
    }
}
