#![allow(dead_code)]

use aero_gl_compat::backend::recording::RecordingBackend;
use aero_gl_compat::shader::MemoryShaderSource;
use aero_gl_compat::vertex::VertexUsage;
use aero_gl_compat::{BufferTarget, LegacyContext, LegacyHandle, TranslatorConfig, VertexFormatDesc};

pub const VERTEX_SHADER: &str = r#"
struct Globals {
    ModelViewMat: mat4x4<f32>,
    ColorModulator: vec4<f32>,
    ScreenSize: vec2<f32>,
}
@group(0) @binding(0) var<uniform> globals: Globals;

@vertex
fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
    return globals.ModelViewMat * vec4<f32>(pos, 1.0);
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
struct Globals {
    ModelViewMat: mat4x4<f32>,
    ColorModulator: vec4<f32>,
    ScreenSize: vec2<f32>,
}
@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var Sampler0: texture_2d<f32>;
@group(1) @binding(1) var sampler0: sampler;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    return textureSample(Sampler0, sampler0, frag.xy / globals.ScreenSize);
}
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn shaders(variants: &[&str]) -> MemoryShaderSource {
    let root = TranslatorConfig::default().shader_root;
    let mut sources = MemoryShaderSource::new();
    for variant in variants {
        sources.insert_variant(&root, variant, VERTEX_SHADER, FRAGMENT_SHADER);
    }
    sources
}

pub fn context_with(variants: &[&str], config: TranslatorConfig) -> LegacyContext<RecordingBackend> {
    init_tracing();
    LegacyContext::new(RecordingBackend::new(), shaders(variants), config).expect("context")
}

pub fn context(variants: &[&str]) -> LegacyContext<RecordingBackend> {
    context_with(variants, TranslatorConfig::default())
}

pub fn position_tex_color() -> VertexFormatDesc {
    VertexFormatDesc::packed([
        (VertexUsage::Position, 0, wgpu::VertexFormat::Float32x3),
        (VertexUsage::TexCoord, 0, wgpu::VertexFormat::Float32x2),
        (VertexUsage::Color, 0, wgpu::VertexFormat::Unorm8x4),
    ])
}

pub fn position_only() -> VertexFormatDesc {
    VertexFormatDesc::packed([(VertexUsage::Position, 0, wgpu::VertexFormat::Float32x3)])
}

/// Program using `shader`, the given vertex format and a filled vertex buffer.
pub fn ready_to_draw(
    ctx: &mut LegacyContext<RecordingBackend>,
    shader: &str,
    format: &VertexFormatDesc,
) -> (LegacyHandle, LegacyHandle) {
    let program = ctx.gen_program();
    ctx.program_shader(program, shader).expect("program");
    ctx.use_program(program);
    ctx.set_vertex_format(format);

    let vb = ctx.gen_buffer(BufferTarget::Vertex);
    ctx.buffer_data(BufferTarget::Vertex, vb, &vec![0u8; format.stride as usize * 4])
        .expect("vertex data");
    (program, vb)
}
