use glam::Vec4;
use gles_batch_renderer::gpu::{
    BlendFactor, BufferId, Capability, CompareFunc, GpuCall, ProgramId, Rect, TextureId,
    TextureTarget,
};
use gles_batch_renderer::renderer::{BlendMode, CullFaceMode, PassState, RenderingContext};
use gles_batch_renderer::{RecordingDevice, RenderSettings};

fn context() -> RenderingContext<RecordingDevice> {
    let mut context = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
    context.set_window_size(640, 480);
    context.device_mut().clear_calls();
    context
}

/// Runs `apply` twice and returns how many device calls each run issued.
fn twice(apply: impl Fn(&mut RenderingContext<RecordingDevice>)) -> (usize, usize) {
    let mut ctx = context();
    apply(&mut ctx);
    let first = ctx.device().calls().len();
    ctx.device_mut().clear_calls();
    apply(&mut ctx);
    (first, ctx.device().calls().len())
}

#[test]
fn repeated_setters_reach_the_device_once() {
    let setters: Vec<(&str, Box<dyn Fn(&mut RenderingContext<RecordingDevice>)>)> = vec![
        ("blend", Box::new(|c| c.set_blend_mode(BlendMode::Additive))),
        ("depth test", Box::new(|c| c.set_depth_test(true))),
        ("depth func", Box::new(|c| c.set_depth_func(CompareFunc::LessEqual))),
        ("cull", Box::new(|c| c.set_cull_face_mode(CullFaceMode::Front))),
        ("color mask", Box::new(|c| c.set_color_mask(false))),
        ("depth mask", Box::new(|c| c.set_depth_mask(false))),
        ("clear color", Box::new(|c| c.set_clear_color(Vec4::new(0.1, 0.2, 0.3, 1.0)))),
        ("viewport", Box::new(|c| c.set_viewport(Rect::new(0, 0, 32, 32)))),
        ("scissor", Box::new(|c| c.set_scissor(Some(Rect::new(4, 4, 8, 8))))),
        ("texture unit", Box::new(|c| c.set_active_texture_unit(3))),
        (
            "texture",
            Box::new(|c| {
                c.bind_texture(2, TextureTarget::Texture2D, Some(TextureId(77)));
            }),
        ),
        ("vertex buffer", Box::new(|c| c.set_vertex_buffer(Some(BufferId(5))))),
        ("index buffer", Box::new(|c| c.set_index_buffer(Some(BufferId(6))))),
        (
            "program",
            Box::new(|c| {
                c.set_program(Some(ProgramId(9)));
            }),
        ),
    ];

    for (name, setter) in setters {
        let (first, second) = twice(setter);
        assert!(first >= 1, "{name}: first call must reach the device");
        assert_eq!(second, 0, "{name}: repeated call must be a no-op");
    }
}

#[test]
fn whole_pass_state_is_deduplicated() {
    let pass = PassState::default()
        .with_blend_mode(BlendMode::Alpha)
        .with_depth(true, false, CompareFunc::LessEqual)
        .with_cull_face(CullFaceMode::Back);
    let (first, second) = twice(move |c| c.setup_pass(&pass));
    assert!(first > 0);
    assert_eq!(second, 0);
}

#[test]
fn texture_units_are_tracked_independently() {
    let mut ctx = context();
    ctx.bind_texture(0, TextureTarget::Texture2D, Some(TextureId(1)));
    ctx.bind_texture(1, TextureTarget::Texture2D, Some(TextureId(2)));
    ctx.device_mut().clear_calls();

    // Unit 0 still holds texture 1 although unit 1 is active.
    ctx.bind_texture(0, TextureTarget::Texture2D, Some(TextureId(1)));
    assert!(ctx.device().calls().is_empty());
    assert_eq!(ctx.active_texture_unit(), 1);
    assert_eq!(ctx.texture_at(0), Some(TextureId(1)));
    assert_eq!(ctx.texture_at(1), Some(TextureId(2)));
}

#[test]
fn reset_reissues_blend_even_when_unchanged() {
    let mut ctx = context();
    ctx.set_blend_mode(BlendMode::Alpha);

    ctx.reset_cached_state();
    ctx.device_mut().clear_calls();
    ctx.set_blend_mode(BlendMode::Alpha);

    let device = ctx.device();
    assert_eq!(device.count(|c| *c == GpuCall::Enable(Capability::Blend)), 1);
    assert_eq!(
        device.count(|c| *c
            == GpuCall::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)),
        1
    );
}

#[test]
fn reset_pushes_defaults_unconditionally() {
    let mut ctx = context();
    ctx.reset_cached_state();
    let first = ctx.device().calls().to_vec();
    ctx.device_mut().clear_calls();
    ctx.reset_cached_state();
    assert_eq!(ctx.device().calls(), first.as_slice());
    assert!(first.contains(&GpuCall::Disable(Capability::Blend)));
    assert!(first.contains(&GpuCall::UseProgram(None)));
}
