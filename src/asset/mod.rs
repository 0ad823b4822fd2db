pub mod cache;
pub mod handle;
pub mod mesh;

pub use cache::AssetCache;
pub use handle::Handle;
pub use mesh::Mesh;

use crate::renderer::{Material, Texture};

/// Everything nodes reference by handle.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub materials: AssetCache<Material>,
    pub textures: AssetCache<Texture>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
            textures: AssetCache::new(),
        }
    }

    /// Drops every GPU id without touching the device. The next readiness
    /// check re-uploads.
    pub fn forget_gpu_objects(&mut self) {
        for mesh in self.meshes.iter_mut() {
            mesh.forget();
        }
        for texture in self.textures.iter_mut() {
            texture.forget();
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
