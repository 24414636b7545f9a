//! Host reference backend.
//!
//! Implements the [`Raster`] contract on plain `Vec<f32>` textures so the
//! packing, aliasing and dispatch protocol can be exercised without a
//! GPU. Kernels are host closures registered against the exact source
//! text they stand in for; compiling an unregistered source behaves like
//! a shader that failed to link.

use crate::error::{Error, Result};
use crate::packing::pack;
use crate::raster::{KernelId, Raster, TextureId, MAX_KERNEL_INPUTS};
use std::collections::HashMap;
use std::sync::Arc;

/// One fragment invocation: the texel being produced plus read access to
/// the bound input textures.
pub struct Frag<'a> {
    /// Texel x coordinate.
    pub x: u32,
    /// Texel y coordinate.
    pub y: u32,
    /// Row width of the output texture (the `w` uniform).
    pub w: u32,
    inputs: &'a [CpuTexture],
    bound: &'a [usize],
}

impl Frag<'_> {
    /// Flattened element index of the texel being produced.
    #[inline]
    pub fn index(&self) -> usize {
        (self.y * self.w + self.x) as usize
    }

    /// Fetch element `index` of input `input` (0-based, in binding
    /// order), clamping to the texture edge like the GPU sampler.
    pub fn fetch(&self, input: usize, index: i64) -> f32 {
        let t = &self.inputs[self.bound[input]];
        let last = t.data.len() as i64 - 1;
        t.data[index.clamp(0, last) as usize]
    }

    /// Packed extent of input `input`.
    pub fn extent(&self, input: usize) -> (u32, u32) {
        let t = &self.inputs[self.bound[input]];
        (t.width, t.height)
    }
}

/// Kernel body evaluated once per output texel.
pub type KernelFn = dyn Fn(&Frag<'_>) -> f32 + Send + Sync;

#[derive(Clone)]
struct RegisteredKernel {
    arity: usize,
    body: Arc<KernelFn>,
}

struct CpuTexture {
    width: u32,
    height: u32,
    elements: usize,
    data: Vec<f32>,
}

/// CPU implementation of the [`Raster`] capability surface.
pub struct CpuRaster {
    max_dim: u32,
    library: HashMap<String, RegisteredKernel>,
    kernels: Vec<Option<RegisteredKernel>>,
    names: Vec<String>,
    textures: Vec<CpuTexture>,
}

impl CpuRaster {
    /// Backend with the default 8192 maximum texture dimension.
    pub fn new() -> Self {
        Self::with_max_dim(8192)
    }

    /// Backend with a custom maximum dimension, handy for exercising the
    /// packer against small limits.
    pub fn with_max_dim(max_dim: u32) -> Self {
        Self {
            max_dim,
            library: HashMap::new(),
            kernels: Vec::new(),
            names: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// Register a host closure as the meaning of `source`.
    ///
    /// Compilation then resolves kernels by exact source text, the same
    /// way a driver resolves the artifact it is handed.
    pub fn register<F>(&mut self, source: &str, arity: usize, body: F)
    where
        F: Fn(&Frag<'_>) -> f32 + Send + Sync + 'static,
    {
        assert!(arity <= MAX_KERNEL_INPUTS);
        self.library.insert(
            source.to_string(),
            RegisteredKernel {
                arity,
                body: Arc::new(body),
            },
        );
    }

    fn texture(&self, id: TextureId) -> Result<&CpuTexture> {
        self.textures.get(id.0 as usize).ok_or(Error::BadHandle)
    }
}

impl Default for CpuRaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Raster for CpuRaster {
    fn max_texture_dim(&self) -> u32 {
        self.max_dim
    }

    fn compile(&mut self, name: &str, source: &str, inputs: usize) -> KernelId {
        let id = KernelId(self.kernels.len() as u32);
        self.names.push(name.to_string());
        match self.library.get(source) {
            Some(k) if k.arity == inputs => self.kernels.push(Some(k.clone())),
            Some(k) => {
                log::error!(
                    "kernel `{name}` failed to compile: registered for {} inputs, linked for {inputs}",
                    k.arity
                );
                self.kernels.push(None);
            }
            None => {
                log::error!("kernel `{name}` failed to compile: unknown source");
                self.kernels.push(None);
            }
        }
        id
    }

    fn kernel_ok(&self, kernel: KernelId) -> bool {
        matches!(self.kernels.get(kernel.0 as usize), Some(Some(_)))
    }

    fn create_texture(&mut self, elements: usize, init: Option<&[u8]>) -> Result<TextureId> {
        if elements == 0 {
            return Err(Error::Plan("texture of zero elements".to_string()));
        }

        let (width, height) = pack(elements, self.max_dim);
        let texels = width as usize * height as usize;
        let mut data = vec![0.0f32; texels];

        if let Some(bytes) = init {
            if bytes.len() % 4 != 0 {
                return Err(Error::UnalignedTensor(bytes.len()));
            }
            let floats: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            if floats.len() != elements {
                log::warn!(
                    "payload holds {} floats for a {elements}-element texture",
                    floats.len()
                );
            }
            let n = floats.len().min(texels);
            data[..n].copy_from_slice(&floats[..n]);
        }

        let id = TextureId(self.textures.len() as u32);
        self.textures.push(CpuTexture {
            width,
            height,
            elements,
            data,
        });
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()> {
        self.texture(texture)?;
        let t = &mut self.textures[texture.0 as usize];
        t.data.fill(0.0);
        let n = data.len().min(t.data.len());
        t.data[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    fn read_texture(&self, texture: TextureId) -> Result<Vec<f32>> {
        Ok(self.texture(texture)?.data.clone())
    }

    fn texture_extent(&self, texture: TextureId) -> Result<(u32, u32)> {
        let t = self.texture(texture)?;
        Ok((t.width, t.height))
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        output: TextureId,
        inputs: &[TextureId],
    ) -> Result<()> {
        let kern = self
            .kernels
            .get(kernel.0 as usize)
            .ok_or(Error::BadHandle)?
            .clone()
            .ok_or_else(|| Error::NullKernel(self.names[kernel.0 as usize].clone()))?;
        assert_eq!(inputs.len(), kern.arity);

        let bound: Vec<usize> = inputs.iter().map(|id| id.0 as usize).collect();
        for &i in &bound {
            if i >= self.textures.len() {
                return Err(Error::BadHandle);
            }
        }
        self.texture(output)?;

        let (w, h) = {
            let t = &self.textures[output.0 as usize];
            (t.width, t.height)
        };

        // The output never appears among the inputs (plan validation
        // rejects it), so its data can be taken out while the closure
        // reads the rest of the arena.
        let mut data = std::mem::take(&mut self.textures[output.0 as usize].data);
        for y in 0..h {
            for x in 0..w {
                let frag = Frag {
                    x,
                    y,
                    w,
                    inputs: &self.textures,
                    bound: &bound,
                };
                data[(y * w + x) as usize] = (kern.body)(&frag);
            }
        }
        self.textures[output.0 as usize].data = data;

        log::trace!("dispatched kernel `{}`", self.names[kernel.0 as usize]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILL: &str = "fill:7";

    fn backend() -> CpuRaster {
        let mut r = CpuRaster::new();
        r.register(FILL, 0, |_| 7.0);
        r
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let mut r = CpuRaster::new();
        let floats: Vec<f32> = (0..64).map(|i| i as f32 * 0.5 - 3.0).collect();
        let bytes: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
        let tex = r.create_texture(64, Some(&bytes)).unwrap();
        assert_eq!(r.read_texture(tex).unwrap(), floats);
    }

    #[test]
    fn zero_fill_by_default() {
        let mut r = CpuRaster::new();
        let tex = r.create_texture(10, None).unwrap();
        assert_eq!(r.read_texture(tex).unwrap(), vec![0.0; 10]);
    }

    #[test]
    fn unknown_source_yields_null_kernel() {
        let mut r = backend();
        let bad = r.compile("bogus", "no such kernel", 0);
        assert!(!r.kernel_ok(bad));
        let out = r.create_texture(4, None).unwrap();
        assert!(matches!(
            r.dispatch(bad, out, &[]),
            Err(Error::NullKernel(_))
        ));
    }

    #[test]
    fn dispatch_covers_every_texel() {
        let mut r = backend();
        let k = r.compile("fill", FILL, 0);
        assert!(r.kernel_ok(k));
        let out = r.create_texture(12, None).unwrap();
        r.dispatch(k, out, &[]).unwrap();
        assert_eq!(r.read_texture(out).unwrap(), vec![7.0; 12]);
    }

    #[test]
    fn fetch_clamps_to_edges() {
        let mut r = CpuRaster::new();
        r.register("probe", 1, |f| f.fetch(0, -5) + f.fetch(0, 100));
        let k = r.compile("probe", "probe", 1);
        let input = r
            .create_texture(3, Some(bytemuck::cast_slice(&[1.0f32, 2.0, 3.0])))
            .unwrap();
        let out = r.create_texture(1, None).unwrap();
        r.dispatch(k, out, &[input]).unwrap();
        // Below the range clamps to the first element, past it to the last.
        assert_eq!(r.read_texture(out).unwrap(), vec![4.0]);
    }
}
