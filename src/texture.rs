//! Tensor-backed GPU textures.
//!
//! One flattened tensor lives in one 2D `R32Float` texture. Data is
//! uploaded once for weights, rewritten in place for the external input,
//! and only the graph output ever comes back to the CPU.

use crate::device::GpuDevice;
use crate::error::{Error, Result};
use crate::packing::pack;

/// GPU-resident tensor texture.
///
/// Carries the packed extent, the logical element count, and a small
/// uniform buffer holding its own row width so a dispatch can bind `w`
/// for whichever texture is the render target.
pub struct GpuTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) w_uniform: wgpu::Buffer,
    width: u32,
    height: u32,
    elements: usize,
}

impl GpuTexture {
    /// Allocate a texture for `elements` floats, optionally uploading an
    /// initial payload of little-endian f32 bytes.
    ///
    /// Sampling state is fixed by the kernel contract (nearest filter,
    /// clamp to edge) and lives in the shared sampler, not here. When
    /// the packer falls back to an over-wide single row the width is
    /// clamped to the device limit: the texture is then under-sized and
    /// texels past the end are unspecified, mirroring the lossy
    /// fallback instead of aborting.
    pub fn new(device: &GpuDevice, elements: usize, init: Option<&[u8]>) -> Result<Self> {
        if elements == 0 {
            return Err(Error::Plan("texture of zero elements".to_string()));
        }

        let max = device.max_texture_dim();
        let (mut width, height) = pack(elements, max);
        if width > max {
            log::warn!("clamping {width}-texel row to the {max} device limit");
            width = max;
        }

        let texture = device.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("tensor_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let w_uniform =
            device.create_uniform_buffer("row_width", bytemuck::bytes_of(&(width as i32)));

        let this = Self {
            texture,
            view,
            w_uniform,
            width,
            height,
            elements,
        };

        match init {
            Some(bytes) => {
                if bytes.len() % 4 != 0 {
                    return Err(Error::UnalignedTensor(bytes.len()));
                }
                let floats: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                if floats.len() != elements {
                    log::warn!(
                        "payload holds {} floats for a {}-element texture",
                        floats.len(),
                        elements
                    );
                }
                this.upload(device, &floats);
            }
            None => this.upload(device, &[]),
        }

        Ok(this)
    }

    /// Re-upload the full extent. `data` fills the texture from element
    /// zero; remaining texels are zeroed.
    pub fn upload(&self, device: &GpuDevice, data: &[f32]) {
        let texel_count = self.width as usize * self.height as usize;
        let mut texels = vec![0.0f32; texel_count];
        let n = data.len().min(texel_count);
        texels[..n].copy_from_slice(&data[..n]);

        device.queue().write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Download the texture as `width * height` floats.
    pub fn download(&self, device: &GpuDevice) -> Result<Vec<f32>> {
        device.read_texture(&self.texture, self.width, self.height)
    }

    /// Packed width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Packed height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Logical element count of the tensor this texture backs.
    #[inline]
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// VRAM usage in bytes.
    #[inline]
    pub fn memory_bytes(&self) -> usize {
        self.width as usize * self.height as usize * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Display for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GpuTexture[{}x{}, {} elements, {} bytes VRAM]",
            self.width,
            self.height,
            self.elements,
            self.memory_bytes(),
        )
    }
}
