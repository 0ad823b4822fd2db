pub mod asset;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use asset::{AssetCache, Assets, Handle, Mesh};
pub use gpu::{GpuDevice, RecordingDevice};
pub use renderer::{Renderer, RendererStats, RenderingContext};
pub use scene::{Camera, Scene, Transform};
pub use settings::RenderSettings;

/// Installs the `env_logger` backend for the `log` facade. Defaults to
/// `info`; `RUST_LOG` overrides it. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
