//! texelnet: neural-network inference on the rasterization pipeline.
//!
//! A frozen forward pass where every tensor is a 2D single-channel float
//! texture and every operator (or fused chain of operators) is a
//! fragment-shader kernel fired by one full-screen draw. The network
//! itself is data: an offline tensor-graph compiler emits the kernel
//! sources and a straight-line step list, and this crate is the runtime
//! that packs tensors into legal texture shapes, slices weights out of
//! their container, and replays the schedule.
//!
//! # Architecture
//!
//! ```text
//!   ┌───────────┐     ┌────────────────┐     ┌─────────────────┐
//!   │ NetPlan   │     │ WeightStore    │     │ GpuDevice (wgpu)│
//!   │ slots     │     │ [u64 len][JSON │     └────────┬────────┘
//!   │ kernels   │     │  header][f32   │              │
//!   │ steps     │     │  payloads]     │     ┌────────▼────────┐
//!   └─────┬─────┘     └───────┬────────┘     │ GpuRaster       │
//!         │                   │              │  KernelRegistry │
//!         └───────┬───────────┘              │  GpuTexture[]   │
//!                 ▼                          │  sampler + quad │
//!          ┌─────────────┐   Raster trait    └────────▲────────┘
//!          │ Net::setup  │───────────────────────────┘
//!          │ Net::infer  │───────────────┐
//!          └─────────────┘               ▼
//!                              ┌──────────────────┐
//!                              │ CpuRaster        │
//!                              │ (host reference) │
//!                              └──────────────────┘
//! ```
//!
//! Per step, the fragment kernel runs exactly once per output texel,
//! recovering the flattened element index as `y * w + x`. Intermediate
//! data never leaves the GPU; only the graph output is read back.
//!
//! # Example
//!
//! ```no_run
//! use texelnet::{GpuRaster, Net, NetPlan, WeightStore};
//!
//! let plan = NetPlan::from_json(&std::fs::read_to_string("net.json")?)?;
//! let weights = WeightStore::open("net.safetensors")?;
//! let mut net = Net::setup(GpuRaster::init()?, &plan, &weights)?;
//! let output = net.infer(&std::fs::read("input.bin")?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod gpu;
pub mod inference;
pub mod packing;
pub mod pipeline;
pub mod plan;
pub mod raster;
pub mod reference;
pub mod texture;
pub mod weights;

// ============================================================================
// Core Re-exports
// ============================================================================

pub use device::GpuDevice;
pub use error::{Error, Result};
pub use gpu::GpuRaster;
pub use inference::Net;
pub use packing::pack;
pub use pipeline::KernelRegistry;
pub use plan::{KernelSpec, NetPlan, SlotSpec, StepSpec};
pub use raster::{KernelId, Raster, TextureId, MAX_KERNEL_INPUTS};
pub use reference::{CpuRaster, Frag};
pub use texture::GpuTexture;
pub use weights::{decode_f32, TensorMeta, WeightStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Prelude
// ============================================================================

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::CpuRaster;
    pub use crate::GpuDevice;
    pub use crate::GpuRaster;
    pub use crate::Net;
    pub use crate::NetPlan;
    pub use crate::Raster;
    pub use crate::WeightStore;
}

// ============================================================================
// Tests
// ============================================================================
