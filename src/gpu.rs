//! The wgpu rasterization backend.
//!
//! Owns the device, the kernel registry, the texture arena, the shared
//! nearest/clamp sampler and the static full-screen quad. A dispatch is
//! one render pass: bind the output as the sole color attachment, bind
//! the `w` uniform and the input textures, set the viewport, draw the
//! quad once.

use crate::device::GpuDevice;
use crate::error::{Error, Result};
use crate::pipeline::KernelRegistry;
use crate::raster::{KernelId, Raster, TextureId, FULLSCREEN_QUAD};
use crate::texture::GpuTexture;

/// GPU implementation of the [`Raster`] capability surface.
pub struct GpuRaster {
    device: GpuDevice,
    registry: KernelRegistry,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    textures: Vec<GpuTexture>,
}

impl GpuRaster {
    /// Build the backend over an already initialized device.
    pub fn new(device: GpuDevice) -> Self {
        let registry = KernelRegistry::new(&device);

        // Exact texel fetches only: never interpolate, never wrap.
        let sampler = device.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texel_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quad = device.create_vertex_buffer("fullscreen_quad", bytemuck::cast_slice(&FULLSCREEN_QUAD));

        Self {
            device,
            registry,
            sampler,
            quad,
            textures: Vec::new(),
        }
    }

    /// Initialize a device and build the backend in one step.
    pub fn init() -> Result<Self> {
        Ok(Self::new(GpuDevice::new()?))
    }

    /// The underlying device handle.
    pub fn device(&self) -> &GpuDevice {
        &self.device
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture> {
        self.textures.get(id.0 as usize).ok_or(Error::BadHandle)
    }
}

impl Raster for GpuRaster {
    fn max_texture_dim(&self) -> u32 {
        self.device.max_texture_dim()
    }

    fn compile(&mut self, name: &str, source: &str, inputs: usize) -> KernelId {
        self.registry.compile(&self.device, name, source, inputs)
    }

    fn kernel_ok(&self, kernel: KernelId) -> bool {
        self.registry.is_linked(kernel)
    }

    fn create_texture(&mut self, elements: usize, init: Option<&[u8]>) -> Result<TextureId> {
        let texture = GpuTexture::new(&self.device, elements, init)?;
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture);
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()> {
        self.texture(texture)?.upload(&self.device, data);
        Ok(())
    }

    fn read_texture(&self, texture: TextureId) -> Result<Vec<f32>> {
        self.texture(texture)?.download(&self.device)
    }

    fn texture_extent(&self, texture: TextureId) -> Result<(u32, u32)> {
        let t = self.texture(texture)?;
        Ok((t.width(), t.height()))
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        output: TextureId,
        inputs: &[TextureId],
    ) -> Result<()> {
        let kern = self
            .registry
            .get(kernel)
            .ok_or_else(|| Error::NullKernel(self.registry.name(kernel).to_string()))?;
        assert_eq!(
            inputs.len(),
            kern.arity,
            "kernel `{}` linked for {} inputs, dispatched with {}",
            self.registry.name(kernel),
            kern.arity,
            inputs.len()
        );

        let out = self.texture(output)?;

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: out.w_uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        let mut views = Vec::with_capacity(inputs.len());
        for &input in inputs {
            views.push(&self.texture(input)?.view);
        }
        for (i, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: wgpu::BindingResource::TextureView(*view),
            });
        }

        let bind_group = self
            .device
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kernel_bg"),
                layout: self.registry.layout_for(kern.arity),
                entries: &entries,
            });

        let mut encoder = self
            .device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kernel_enc"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(self.registry.name(kernel)),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &out.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&kern.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.slice(..));
            pass.set_viewport(0.0, 0.0, out.width() as f32, out.height() as f32, 0.0, 1.0);
            pass.draw(0..4, 0..1);
        }

        self.device.submit(encoder);
        log::trace!("dispatched kernel `{}`", self.registry.name(kernel));

        Ok(())
    }
}
