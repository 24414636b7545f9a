//! The rasterization capability surface.
//!
//! Everything the execution engine needs from a graphics API is behind
//! [`Raster`]: compile a fragment kernel, create and fill single-channel
//! float textures, dispatch one full-screen draw per step, read the
//! result back. [`crate::GpuRaster`] implements it over wgpu;
//! [`crate::CpuRaster`] implements it on the host so the runtime can be
//! tested without a GPU.
//!
//! # Kernel contract
//!
//! A fragment kernel is an opaque WGSL artifact produced offline. It is
//! linked against the fixed full-screen vertex stage and must follow one
//! binding layout (group 0):
//!
//! | binding | resource                                     |
//! |---------|----------------------------------------------|
//! | 0       | `var<uniform> w: i32` (output row width)     |
//! | 1       | non-filtering clamp-to-edge sampler          |
//! | 2..=8   | `texture_2d<f32>` inputs `data1` .. `data7`  |
//!
//! A kernel may declare any subset of these. It recovers the flattened
//! element index of the texel it is producing as
//! `i32(pos.y) * w + i32(pos.x)` from `@builtin(position)`, and returns
//! one `f32` for the `R32Float` target. The draw covers the whole output
//! texture, so the kernel runs exactly once per tensor element.

use crate::error::Result;

/// Most input textures a single kernel may sample.
pub const MAX_KERNEL_INPUTS: usize = 7;

/// The fixed vertex stage shared by every kernel: passes a clip-space
/// position and a UV through unchanged.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

/// Full-screen quad as a 4-vertex triangle strip, interleaved
/// `(x, y, u, v)` per vertex.
pub const FULLSCREEN_QUAD: [f32; 16] = [
    -1.0, 1.0, 0.0, 1.0, //
    -1.0, -1.0, 0.0, 0.0, //
    1.0, 1.0, 1.0, 1.0, //
    1.0, -1.0, 1.0, 0.0,
];

/// Handle to a texture owned by a [`Raster`] backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Handle to a compiled (or failed) kernel program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub(crate) u32);

/// Capability surface consumed by the execution engine.
///
/// The backend owns every resource it hands out an id for; resources
/// live until the backend is dropped. All methods are synchronous from
/// the caller's perspective.
pub trait Raster {
    /// Largest width or height a single texture may have.
    fn max_texture_dim(&self) -> u32;

    /// Compile a fragment kernel expecting `inputs` textures.
    ///
    /// A failed compile is logged and still returns a handle; the handle
    /// is *null* ([`Raster::kernel_ok`] is false) and any dispatch of it
    /// fails with [`crate::Error::NullKernel`] instead of silently
    /// no-opping.
    fn compile(&mut self, name: &str, source: &str, inputs: usize) -> KernelId;

    /// Whether a kernel compiled and linked successfully.
    fn kernel_ok(&self, kernel: KernelId) -> bool;

    /// Create a texture holding `elements` f32 values, packed to legal
    /// dimensions. `init` is uploaded as little-endian f32 when given,
    /// otherwise the texture is zero-filled.
    fn create_texture(&mut self, elements: usize, init: Option<&[u8]>) -> Result<TextureId>;

    /// Re-upload the full extent of an existing texture.
    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()>;

    /// Synchronously read a texture back as `width * height` floats.
    fn read_texture(&self, texture: TextureId) -> Result<Vec<f32>>;

    /// Width and height of a texture.
    fn texture_extent(&self, texture: TextureId) -> Result<(u32, u32)>;

    /// Run one kernel over every texel of `output`, sampling `inputs`
    /// bound in order as `data1..dataN`.
    fn dispatch(&mut self, kernel: KernelId, output: TextureId, inputs: &[TextureId])
        -> Result<()>;
}
