mod common;

use std::sync::Arc;

use aero_gl_compat::backend::recording::{BackendCommand, RecordingBackend};
use aero_gl_compat::state::LegacyPrimitive;
use aero_gl_compat::vertex::VertexUsage;
use aero_gl_compat::{
    DrawCall, DrawOutcome, PipelineManager, SkipReason, TranslatorConfig, VertexFormatCaps,
    VertexFormatDesc,
};
use pretty_assertions::assert_eq;

use common::{context, position_only, position_tex_color, ready_to_draw, shaders};

fn linked_labels(backend: &RecordingBackend) -> Vec<String> {
    backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::LinkPipeline { label, .. } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

fn full_caps() -> VertexFormatCaps {
    VertexFormatCaps::POSITION | VertexFormatCaps::UV0 | VertexFormatCaps::COLOR
}

fn position_tex() -> VertexFormatDesc {
    VertexFormatDesc::packed([
        (VertexUsage::Position, 0, wgpu::VertexFormat::Float32x3),
        (VertexUsage::TexCoord, 0, wgpu::VertexFormat::Float32x2),
    ])
}

#[test]
fn bare_name_expands_from_vertex_format() {
    for (format, expected) in [
        (position_tex(), "position_tex"),
        (position_tex_color(), "position_tex_color"),
        (position_only(), "position"),
    ] {
        let mut ctx = context(&["position", "position_tex", "position_tex_color"]);
        let (_, vb) = ready_to_draw(&mut ctx, "position", &format);
        assert_eq!(
            ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3)),
            DrawOutcome::Submitted
        );
        assert_eq!(linked_labels(ctx.backend()), vec![expected.to_string()]);
    }
}

#[test]
fn qualified_name_downgrades_to_available_attributes() {
    let mut ctx = context(&["position_color", "position_tex_color"]);
    let (_, vb) = ready_to_draw(&mut ctx, "position_tex_color", &position_only());
    assert_eq!(
        ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3)),
        DrawOutcome::Submitted
    );
    assert_eq!(linked_labels(ctx.backend()), vec!["position_color".to_string()]);
    assert_eq!(ctx.stats().variant_downgrades, 1);
}

#[test]
fn prefixed_names_are_used_verbatim() {
    let mut ctx = context(&["rendertype_solid"]);
    let (_, vb) = ready_to_draw(&mut ctx, "rendertype_solid", &position_tex_color());
    ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3));
    assert_eq!(linked_labels(ctx.backend()), vec!["rendertype_solid".to_string()]);
}

#[test]
fn missing_variant_falls_back_once() {
    // Only the fallback variant has sources.
    let mut ctx = context(&["position_tex_color"]);
    let (_, vb) = ready_to_draw(&mut ctx, "position_tex", &position_tex());
    let call = DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3);

    assert_eq!(ctx.draw(&call), DrawOutcome::Submitted);
    assert_eq!(ctx.draw(&call), DrawOutcome::Submitted);
    assert_eq!(linked_labels(ctx.backend()), vec!["position_tex_color".to_string()]);

    let stats = ctx.stats();
    assert_eq!(stats.fallbacks_used, 1);
    assert_eq!(stats.pipelines_built, 1);
    assert_eq!(stats.pipeline_cache_misses, 1);
    assert_eq!(stats.pipeline_cache_hits, 1);
}

#[test]
fn failed_build_and_fallback_mark_unusable() {
    let mut ctx = context(&[]);
    let (_, vb) = ready_to_draw(&mut ctx, "position", &position_tex_color());
    let call = DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3);

    assert_eq!(
        ctx.draw(&call),
        DrawOutcome::Skipped(SkipReason::UnusablePipeline("position".to_string()))
    );
    assert!(ctx
        .pipelines()
        .is_unusable("position_tex_color", full_caps()));

    // No retry on later draws.
    ctx.backend_mut().clear_commands();
    assert!(matches!(
        ctx.draw(&call),
        DrawOutcome::Skipped(SkipReason::UnusablePipeline(_))
    ));
    assert!(ctx.backend().commands().is_empty());
    assert_eq!(ctx.stats().pipeline_cache_misses, 1);
}

#[test]
fn link_failure_releases_compiled_stages() {
    let mut ctx = context(&["position_tex_color"]);
    ctx.backend_mut().fail_link_for("position_tex_color");
    let (_, vb) = ready_to_draw(&mut ctx, "position", &position_tex_color());

    assert!(matches!(
        ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3)),
        DrawOutcome::Skipped(SkipReason::UnusablePipeline(_))
    ));
    let backend = ctx.backend();
    let compiled: Vec<_> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::CompileShader { handle, .. } => Some(*handle),
            _ => None,
        })
        .collect();
    assert_eq!(compiled.len(), 2);
    assert!(compiled.iter().all(|h| !backend.is_live(*h)));
    assert_eq!(backend.invalid_destroys(), 0);
}

#[test]
fn rejected_variant_uses_fallback() {
    let mut ctx = context(&["position_tex", "position_tex_color"]);
    let (_, vb) = ready_to_draw(&mut ctx, "position_tex", &position_tex());
    ctx.backend_mut().fail_link_for("position_tex");
    assert_eq!(
        ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3)),
        DrawOutcome::Submitted
    );
    assert_eq!(linked_labels(ctx.backend()), vec!["position_tex_color".to_string()]);
    let caps = VertexFormatCaps::POSITION | VertexFormatCaps::UV0;
    assert!(ctx.pipelines().cached("position_tex", caps).is_some());
}

#[test]
fn equivalent_requests_share_one_pipeline() {
    let config = TranslatorConfig::default();
    let mut backend = RecordingBackend::new();
    let mut manager = PipelineManager::new(Box::new(shaders(&["position_tex_color"])), &config);
    let caps = VertexFormatCaps::POSITION | VertexFormatCaps::UV0 | VertexFormatCaps::COLOR;

    let a = manager
        .get_or_create_pipeline(&mut backend, "position", caps)
        .expect("pipeline");
    let b = manager
        .get_or_create_pipeline(&mut backend, "position_tex_color", caps)
        .expect("pipeline");
    let c = manager
        .get_or_create_pipeline(&mut backend, "position", caps)
        .expect("pipeline");
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(manager.pipeline_count(), 1);
    assert_eq!(manager.stats().builds, 1);
    assert_eq!(backend.count(|c| matches!(c, BackendCommand::LinkPipeline { .. })), 1);
}

#[test]
fn one_variant_links_once_per_vertex_format() {
    let mut ctx = context(&["rendertype_solid"]);
    let (_, textured) = ready_to_draw(&mut ctx, "rendertype_solid", &position_tex());
    assert_eq!(
        ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, textured, 0, 3)),
        DrawOutcome::Submitted
    );

    let lit = VertexFormatDesc::packed([
        (VertexUsage::Position, 0, wgpu::VertexFormat::Float32x3),
        (VertexUsage::Color, 0, wgpu::VertexFormat::Unorm8x4),
        (VertexUsage::Normal, 0, wgpu::VertexFormat::Snorm8x4),
    ]);
    let (_, shaded) = ready_to_draw(&mut ctx, "rendertype_solid", &lit);
    assert_eq!(
        ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, shaded, 0, 3)),
        DrawOutcome::Submitted
    );

    let linked: Vec<_> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::LinkPipeline { vertex_caps, .. } => Some(*vertex_caps),
            _ => None,
        })
        .collect();
    let lit_caps = VertexFormatCaps::POSITION | VertexFormatCaps::COLOR | VertexFormatCaps::NORMAL;
    assert_eq!(
        linked,
        vec![VertexFormatCaps::POSITION | VertexFormatCaps::UV0, lit_caps]
    );

    let pipelines = ctx.pipelines();
    let a = pipelines
        .cached("rendertype_solid", VertexFormatCaps::POSITION | VertexFormatCaps::UV0)
        .expect("textured");
    let b = pipelines.cached("rendertype_solid", lit_caps).expect("lit");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(b.vertex_caps, lit_caps);
}

#[test]
fn clearing_the_cache_rebuilds_on_demand() {
    let mut ctx = context(&["position_tex_color"]);
    let (_, vb) = ready_to_draw(&mut ctx, "position", &position_tex_color());
    let call = DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3);
    ctx.draw(&call);
    let first = ctx.pipelines().cached("position_tex_color", full_caps()).expect("cached");

    ctx.clear_pipeline_cache();
    assert!(!ctx.backend().is_live(first.pipeline));
    assert!(!ctx.backend().is_live(first.vertex_shader));
    assert!(ctx.pipelines().cached("position_tex_color", full_caps()).is_none());

    assert_eq!(ctx.draw(&call), DrawOutcome::Submitted);
    let second = ctx.pipelines().cached("position_tex_color", full_caps()).expect("rebuilt");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.id, second.id);
    assert_eq!(ctx.stats().pipelines_built, 2);
    assert_eq!(ctx.backend().invalid_destroys(), 0);
}

#[test]
fn link_desc_carries_reflected_uniform_size() {
    let mut ctx = context(&["position_tex_color"]);
    let (_, vb) = ready_to_draw(&mut ctx, "position", &position_tex_color());
    ctx.draw(&DrawCall::arrays(LegacyPrimitive::Triangles, vb, 0, 3));
    let (caps, size) = ctx
        .backend()
        .commands()
        .iter()
        .find_map(|c| match c {
            BackendCommand::LinkPipeline {
                vertex_caps,
                uniform_buffer_size,
                ..
            } => Some((*vertex_caps, *uniform_buffer_size)),
            _ => None,
        })
        .expect("linked");
    assert_eq!(
        caps,
        VertexFormatCaps::POSITION | VertexFormatCaps::UV0 | VertexFormatCaps::COLOR
    );
    assert_eq!(size, 96);

    // Both stages share one constant buffer at group 0, binding 0.
    let pipeline = ctx
        .pipelines()
        .cached("position_tex_color", full_caps())
        .expect("cached");
    assert_eq!(pipeline.interface.uniform_bindings, vec![(0, 0)]);
    assert!(!pipeline.interface.has_split_uniforms());
}
