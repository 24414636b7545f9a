//! GPU device management.
//!
//! Wraps wgpu initialization into a single struct.
//! Requests high-performance adapter by default.

use crate::error::{Error, Result};

/// GPU device handle for all texelnet operations.
///
/// Holds the wgpu Device and Queue. All textures, buffers and pipelines
/// are created through this handle.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: String,
    max_texture_dim: u32,
}

impl GpuDevice {
    /// Initialize GPU with high-performance adapter.
    ///
    /// # Errors
    /// Returns [`Error::NoAdapter`] when no GPU adapter is available.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Async initialization (for custom runtimes).
    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(Error::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let info = format!(
            "{} ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("texelnet"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| Error::DeviceInit(e.to_string()))?;

        let max_texture_dim = device.limits().max_texture_dimension_2d;

        Ok(Self {
            device,
            queue,
            info,
            max_texture_dim,
        })
    }

    /// Get wgpu device reference.
    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get wgpu queue reference.
    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// GPU adapter info string.
    #[inline]
    pub fn info(&self) -> &str {
        &self.info
    }

    /// Largest width or height the device allows for a 2D texture.
    #[inline]
    pub fn max_texture_dim(&self) -> u32 {
        self.max_texture_dim
    }

    /// Create a vertex buffer with initial data.
    pub fn create_vertex_buffer(&self, label: &str, data: &[u8]) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX,
            })
    }

    /// Create a uniform buffer with initial data.
    pub fn create_uniform_buffer(&self, label: &str, data: &[u8]) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Submit a command encoder.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit([encoder.finish()]);
    }

    /// Poll device until all operations complete.
    pub fn poll_wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Read a single-channel float texture back to the CPU.
    ///
    /// Copies the attachment into a staging buffer whose rows are padded
    /// to the copy alignment, blocks until the map completes, and strips
    /// the padding. This is the one synchronization point of an
    /// inference pass; a failed copy or map is fatal for the call.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> Result<Vec<f32>> {
        let row_bytes = width * 4;
        let padded_row = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let size = padded_row as u64 * height as u64;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_read"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_back"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);
        self.poll_wait();

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll_wait();
        rx.recv()
            .map_err(|_| Error::Readback("map callback never fired".to_string()))?
            .map_err(|e| Error::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            let start = (row * padded_row) as usize;
            let bytes = &data[start..start + row_bytes as usize];
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }
        drop(data);
        staging.unmap();

        Ok(out)
    }
}

impl std::fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "texelnet [{}]", self.info)
    }
}
