//! Error types for the texelnet runtime.

use thiserror::Error;

/// Failures of the runtime, from device bring-up to per-call inference.
///
/// The pipeline is one-shot and strictly ordered: any error invalidates
/// the whole setup or the whole inference pass, there is no retry or
/// partial-result path.
#[derive(Debug, Error)]
pub enum Error {
    /// No GPU adapter satisfied the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// Adapter found, device creation failed.
    #[error("failed to acquire GPU device: {0}")]
    DeviceInit(String),

    /// A fragment kernel failed to compile or link during setup.
    #[error("kernel `{0}` failed to compile or link")]
    KernelCompile(String),

    /// A dispatch reached a kernel whose program never linked.
    #[error("kernel `{0}` has no linked program; refusing to dispatch")]
    NullKernel(String),

    /// The staging copy or buffer map of a readback failed.
    #[error("texture readback failed: {0}")]
    Readback(String),

    /// The weight container is shorter than its own header claims.
    #[error("weight container truncated: {0}")]
    ContainerTruncated(String),

    /// The weight container header is not valid JSON.
    #[error("weight container header is not valid JSON: {0}")]
    ContainerHeader(#[from] serde_json::Error),

    /// A tensor name requested at setup is absent from the container.
    #[error("tensor `{0}` is not present in the weight container")]
    TensorNotFound(String),

    /// A byte range meant to be viewed as f32 has a stray remainder.
    #[error("byte range is not a whole number of f32 values ({0} bytes)")]
    UnalignedTensor(usize),

    /// The execution plan violates the slot-aliasing rules.
    #[error("invalid execution plan: {0}")]
    Plan(String),

    /// The per-call input does not match the declared input slot.
    #[error("input has {got} elements but the graph expects {expected}")]
    InputSize { expected: usize, got: usize },

    /// A texture or kernel handle does not belong to this backend.
    #[error("unknown resource handle")]
    BadHandle,

    /// Reading the weight container from disk failed.
    #[error("failed to read weight container: {0}")]
    Io(#[from] std::io::Error),
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
