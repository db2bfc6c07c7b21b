//! Built-in Resource Tests
//!
//! Tests for:
//! - Texture: async 2x2 PNG, missing file, options, reload
//! - Cubemap: six faces, mismatched faces
//! - Shader: three context steps, compile errors, stage cleanup
//! - Model: OBJ sub-meshes and bounds
//! - AudioClip: WAV upload
//! - ApplicationContext: frame loop driving loads

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use nuro_core::backend::{BackendObject, PixelFormat};
use nuro_core::{
    ApplicationContext, AudioClip, Cubemap, DispatchOutcome, HeadlessBackend, Model,
    ResourceError, ResourceManager, ResourceState, Shader, Texture, TextureOptions,
};
use anyhow::Context;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 40) as u8, (y * 40) as u8, 200, 255])
    })
    .save(&path)
    .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn write_faces(dir: &Path, size: u32) -> anyhow::Result<[PathBuf; 6]> {
    let faces = ["px", "nx", "py", "ny", "pz", "nz"]
        .iter()
        .map(|face| write_png(dir, &format!("{face}.png"), size, size))
        .collect::<anyhow::Result<Vec<_>>>()?;
    faces
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected six cubemap faces"))
}

fn write_text(dir: &Path, name: &str, text: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn write_wav(dir: &Path, name: &str, channels: u16, frames: usize) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..frames * usize::from(channels) {
        writer.write_sample((i as i16) * 10)?;
    }
    writer.finalize()?;
    Ok(path)
}

const VERTEX_SHADER: &str = "#version 330 core\nvoid main() { gl_Position = vec4(0.0); }\n";
const FRAGMENT_SHADER: &str = "#version 330 core\nout vec4 c;\nvoid main() { c = vec4(1.0); }\n";

const TWO_OBJECTS: &str = "\
o floor
v -5.0 0.0 -5.0
v 5.0 0.0 -5.0
v 5.0 0.0 5.0
v -5.0 0.0 5.0
vn 0.0 1.0 0.0
f 1//1 2//1 3//1 4//1
o pillar
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 8.0 1.0
vn 0.0 0.0 1.0
f 5//2 6//2 7//2
";

fn pump_until(
    manager: &ResourceManager,
    backend: &mut HeadlessBackend,
    done: impl Fn() -> bool,
) -> usize {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut productive = 0;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for the worker");
        match manager.dispatch_next(backend) {
            DispatchOutcome::Idle => thread::sleep(Duration::from_millis(1)),
            DispatchOutcome::Dispatched { .. } => productive += 1,
        }
    }
    productive
}

// ============================================================================
// Texture
// ============================================================================

#[test]
fn png_loads_asynchronously_within_three_dispatches() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let path = write_png(dir.path(), "checker.png", 2, 2)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let texture = manager.create("checker", Texture::new(&path));

    manager.load_async(texture.id()).unwrap();
    let productive = pump_until(&manager, &mut backend, || texture.state().is_terminal());

    assert!(productive <= 3);
    assert_eq!(texture.state(), ResourceState::Ready);
    assert_ne!(texture.texture_id(), 0);
    assert_eq!(texture.dimensions(), (2, 2));
    assert!(!texture.has_staged_data());

    let id = texture.backend_id().unwrap();
    match backend.object(id) {
        Some(BackendObject::Texture {
            width,
            height,
            format,
            mip_levels,
            data,
            ..
        }) => {
            assert_eq!((*width, *height), (2, 2));
            assert_eq!(*format, PixelFormat::Rgba8Srgb);
            assert_eq!(*mip_levels, 2);
            assert_eq!(data.len(), 16);
        }
        other => panic!("expected a texture, got {other:?}"),
    }
    // Only the upload touched the backend, from this thread.
    assert_eq!(backend.call_threads(), [thread::current().id()]);
    Ok(())
}

#[test]
fn missing_texture_fails_synchronously_with_no_backend_object() {
    init_logging();
    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let texture = manager.create("ghost", Texture::new("definitely/not/here.png"));

    let err = manager.load_sync(texture.id(), &mut backend).unwrap_err();

    assert!(matches!(
        err.as_resource_error(),
        Some(ResourceError::Io { path, .. }) if path.ends_with("here.png")
    ));
    assert_eq!(texture.state(), ResourceState::Failed);
    assert_eq!(texture.texture_id(), 0);
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn texture_options_reach_the_backend() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_png(dir.path(), "linear.png", 4, 1)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let texture = manager.create(
        "linear",
        Texture::with_options(
            &path,
            TextureOptions {
                srgb: false,
                flip_vertically: true,
                generate_mipmaps: false,
            },
        ),
    );
    manager.load_sync(texture.id(), &mut backend).unwrap();

    match texture.backend_id().and_then(|id| backend.object(id)) {
        Some(BackendObject::Texture {
            format, mip_levels, ..
        }) => {
            assert_eq!(*format, PixelFormat::Rgba8);
            assert_eq!(*mip_levels, 1);
        }
        other => panic!("expected a texture, got {other:?}"),
    }
    Ok(())
}

#[test]
fn reloading_a_texture_replaces_its_backend_object() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_png(dir.path(), "reload.png", 2, 2)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let texture = manager.create("reload", Texture::new(&path));

    manager.load_sync(texture.id(), &mut backend).unwrap();
    let first = texture.texture_id();
    manager.load_sync(texture.id(), &mut backend).unwrap();

    assert_ne!(texture.texture_id(), first);
    assert_eq!(backend.object_count(), 1);
    Ok(())
}

#[test]
fn sync_and_async_texture_loads_leave_the_same_backend_object() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_png(dir.path(), "twin.png", 3, 2)?;

    let manager = ResourceManager::new();
    let mut sync_backend = HeadlessBackend::new();
    let mut async_backend = HeadlessBackend::new();
    let sync_texture = manager.create("twin-sync", Texture::new(&path));
    let async_texture = manager.create("twin-async", Texture::new(&path));

    manager.load_sync(sync_texture.id(), &mut sync_backend)?;
    manager.load_async(async_texture.id())?;
    pump_until(&manager, &mut async_backend, || async_texture.state().is_terminal());
    assert_eq!(async_texture.state(), ResourceState::Ready);

    let uploaded = |backend: &HeadlessBackend, texture: &nuro_core::ResourceHandle<Texture>| {
        match texture.backend_id().and_then(|id| backend.object(id)) {
            Some(BackendObject::Texture {
                width,
                height,
                format,
                mip_levels,
                data,
                ..
            }) => (*width, *height, *format, *mip_levels, data.clone()),
            other => panic!("expected a texture, got {other:?}"),
        }
    };
    assert_eq!(
        uploaded(&sync_backend, &sync_texture),
        uploaded(&async_backend, &async_texture)
    );
    assert_eq!(sync_backend.object_count(), async_backend.object_count());
    Ok(())
}

#[test]
fn backend_rejection_fails_the_upload() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_png(dir.path(), "lost.png", 2, 2)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let texture = manager.create("lost", Texture::new(&path));
    backend.fail_next("device lost");

    let err = manager.load_sync(texture.id(), &mut backend).unwrap_err();
    assert_eq!(
        err.as_resource_error(),
        Some(&ResourceError::Backend("device lost".to_string()))
    );
    assert!(!texture.has_staged_data());

    manager.load_sync(texture.id(), &mut backend).unwrap();
    assert_eq!(texture.state(), ResourceState::Ready);
    Ok(())
}

// ============================================================================
// Cubemap
// ============================================================================

#[test]
fn cubemap_uploads_six_faces() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let faces = write_faces(dir.path(), 4)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let sky = manager.create("sky", Cubemap::new(faces));
    manager.load_async(sky.id()).unwrap();
    pump_until(&manager, &mut backend, || sky.state().is_terminal());

    assert_eq!(sky.state(), ResourceState::Ready);
    assert_eq!(sky.size(), 4);
    let id = nuro_core::BackendId::new(sky.cubemap_id()).unwrap();
    match backend.object(id) {
        Some(BackendObject::Cubemap { size, data, .. }) => {
            assert_eq!(*size, 4);
            assert_eq!(data.len(), 6 * 4 * 4 * 4);
        }
        other => panic!("expected a cubemap, got {other:?}"),
    }
    Ok(())
}

#[test]
fn cubemap_with_mismatched_faces_is_a_decode_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut faces = write_faces(dir.path(), 4)?;
    faces[3] = write_png(dir.path(), "big.png", 8, 8)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let sky = manager.create("sky", Cubemap::new(faces));

    let err = manager.load_sync(sky.id(), &mut backend).unwrap_err();
    assert!(matches!(
        err.as_resource_error(),
        Some(ResourceError::Decode { path, .. }) if path.ends_with("big.png")
    ));
    assert_eq!(sky.cubemap_id(), 0);
    assert_eq!(backend.call_count(), 0);
    Ok(())
}

// ============================================================================
// Shader
// ============================================================================

#[test]
fn shader_compiles_and_links_across_three_dispatches() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let vs = write_text(dir.path(), "basic.vert", VERTEX_SHADER)?;
    let fs = write_text(dir.path(), "basic.frag", FRAGMENT_SHADER)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let shader = manager.create("basic", Shader::new(vs, fs));

    manager.load_async(shader.id()).unwrap();
    let productive = pump_until(&manager, &mut backend, || shader.state().is_terminal());

    assert_eq!(productive, 3);
    assert_eq!(shader.state(), ResourceState::Ready);
    assert_ne!(shader.program_id(), 0);
    // Stage objects are gone once linked.
    assert_eq!(backend.object_count(), 1);
    let program = nuro_core::BackendId::new(shader.program_id()).unwrap();
    assert!(matches!(
        backend.object(program),
        Some(BackendObject::Program { .. })
    ));
    Ok(())
}

#[test]
fn shader_compile_error_cleans_up_stages() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let vs = write_text(dir.path(), "broken.vert", VERTEX_SHADER)?;
    let fs = write_text(dir.path(), "broken.frag", "out vec4 c; // no entry point\n")?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let shader = manager.create("broken", Shader::new(vs, fs));

    let err = manager.load_sync(shader.id(), &mut backend).unwrap_err();
    match err.as_resource_error() {
        Some(ResourceError::Backend(log)) => assert!(log.contains("broken.frag")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(shader.state(), ResourceState::Failed);
    assert_eq!(shader.program_id(), 0);
    assert_eq!(backend.object_count(), 0);
    Ok(())
}

// ============================================================================
// Model
// ============================================================================

#[test]
fn obj_model_uploads_one_mesh_per_object() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_text(dir.path(), "scene.obj", TWO_OBJECTS)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let model = manager.create("scene", Model::new(&path));
    manager.load_async(model.id()).unwrap();
    pump_until(&manager, &mut backend, || model.state().is_terminal());

    assert_eq!(model.state(), ResourceState::Ready);
    let ids = model.mesh_ids();
    assert_eq!(ids.len(), 2);
    match backend.object(ids[0]) {
        Some(BackendObject::Mesh {
            label,
            vertex_count,
            index_count,
            ..
        }) => {
            assert_eq!(label, "floor");
            assert_eq!(*vertex_count, 4);
            assert_eq!(*index_count, 6);
        }
        other => panic!("expected a mesh, got {other:?}"),
    }

    let bounds = model.bounds().unwrap();
    assert_eq!(bounds.min, Vec3::new(-5.0, 0.0, -5.0));
    assert_eq!(bounds.max, Vec3::new(5.0, 8.0, 5.0));
    Ok(())
}

#[test]
fn destroyed_model_frees_every_mesh() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_text(dir.path(), "scene.obj", TWO_OBJECTS)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let model = manager.create("scene", Model::new(&path));
    manager.load_sync(model.id(), &mut backend).unwrap();
    assert_eq!(backend.object_count(), 2);

    manager.destroy(model.id()).unwrap();
    manager.prune(&mut backend);
    assert_eq!(backend.object_count(), 0);
    assert!(model.mesh_ids().is_empty());
    Ok(())
}

#[test]
fn obj_without_geometry_fails_to_decode_before_any_upload() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_text(dir.path(), "empty.obj", "# nothing\n")?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let model = manager.create("empty", Model::new(&path));

    let err = manager.load_sync(model.id(), &mut backend).unwrap_err();
    assert!(matches!(
        err.as_resource_error(),
        Some(ResourceError::Decode { path, .. }) if path.ends_with("empty.obj")
    ));
    assert_eq!(model.state(), ResourceState::Failed);
    assert!(model.mesh_ids().is_empty());
    assert_eq!(backend.call_count(), 0);
    Ok(())
}

// ============================================================================
// Audio
// ============================================================================

#[test]
fn wav_clip_uploads_pcm16() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "beep.wav", 2, 441)?;

    let manager = ResourceManager::new();
    let mut backend = HeadlessBackend::new();
    let clip = manager.create("beep", AudioClip::new(&path));
    manager.load_async(clip.id()).unwrap();
    let productive = pump_until(&manager, &mut backend, || clip.state().is_terminal());

    assert_eq!(productive, 1);
    assert_eq!(clip.state(), ResourceState::Ready);
    let info = clip.info().unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.frames, 441);
    assert_eq!(info.duration(), Duration::from_millis(10));

    let id = nuro_core::BackendId::new(clip.buffer_id()).unwrap();
    match backend.object(id) {
        Some(BackendObject::AudioBuffer {
            sample_rate,
            samples,
            ..
        }) => {
            assert_eq!(*sample_rate, 44_100);
            assert_eq!(samples.len(), 882);
            assert_eq!(samples[1], 10);
        }
        other => panic!("expected an audio buffer, got {other:?}"),
    }
    Ok(())
}

// ============================================================================
// ApplicationContext
// ============================================================================

#[test]
fn frame_loop_drives_background_loads() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let tex_path = write_png(dir.path(), "albedo.png", 2, 2)?;
    let vs = write_text(dir.path(), "lit.vert", VERTEX_SHADER)?;
    let fs = write_text(dir.path(), "lit.frag", FRAGMENT_SHADER)?;

    let mut app = ApplicationContext::new(HeadlessBackend::new());
    let texture = app.resources().create("albedo", Texture::new(tex_path));
    let shader = app.resources().create("lit", Shader::new(vs, fs));
    app.resources().load_async(texture.id()).unwrap();
    app.resources().load_async(shader.id()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut productive = 0;
    while !(texture.is_ready() && shader.is_ready()) {
        assert!(Instant::now() < deadline, "timed out");
        let frame = app.next_frame();
        if frame.dispatch.is_idle() {
            thread::sleep(Duration::from_millis(1));
        } else {
            productive += 1;
        }
    }

    assert_eq!(productive, 4);
    assert!(app.frame_count() >= 4);
    assert_eq!(app.backend().object_count(), 2);
    Ok(())
}

#[test]
fn next_frame_prunes_destroyed_resources() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "click.wav", 1, 64)?;

    let mut app = ApplicationContext::new(HeadlessBackend::new());
    let clip = app.resources().create("click", AudioClip::new(path));
    app.load_sync(clip.id()).unwrap();
    assert_eq!(app.backend().object_count(), 1);

    app.resources().destroy(clip.id()).unwrap();
    let frame = app.next_frame();

    assert_eq!(frame.pruned, 1);
    assert_eq!(frame.frame_count, 1);
    assert!(frame.dispatch.is_idle());
    assert_eq!(app.backend().object_count(), 0);
    assert_eq!(clip.buffer_id(), 0);
    Ok(())
}
