//! Kernel program registry: compile once, dispatch many.
//!
//! Every kernel links the shared full-screen vertex stage with one
//! supplied fragment stage into a render pipeline targeting a single
//! `R32Float` attachment. Bind group layouts are fixed per input arity,
//! so a kernel may use any subset of the contract bindings.

use crate::device::GpuDevice;
use crate::raster::{KernelId, FULLSCREEN_VERTEX_SHADER, MAX_KERNEL_INPUTS};

/// A successfully linked kernel program.
pub(crate) struct CompiledKernel {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) arity: usize,
}

/// Registry of compiled kernel programs.
///
/// Compile or link failure is a fatal configuration error: it is logged
/// and the handle stays null, so the slot can never be dispatched. The
/// engine checks every handle before running.
pub struct KernelRegistry {
    vertex: wgpu::ShaderModule,
    bind_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layouts: Vec<wgpu::PipelineLayout>,
    kernels: Vec<Option<CompiledKernel>>,
    names: Vec<String>,
}

impl KernelRegistry {
    /// Build the registry: vertex module plus one bind group layout per
    /// possible input arity.
    pub fn new(device: &GpuDevice) -> Self {
        let vertex = device
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fullscreen_vertex"),
                source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX_SHADER.into()),
            });

        let bind_layouts: Vec<wgpu::BindGroupLayout> = (0..=MAX_KERNEL_INPUTS)
            .map(|arity| Self::bind_group_layout(device, arity))
            .collect();

        let pipeline_layouts = bind_layouts
            .iter()
            .enumerate()
            .map(|(arity, layout)| {
                device
                    .device()
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(&format!("kernel_layout_{arity}")),
                        bind_group_layouts: &[layout],
                        push_constant_ranges: &[],
                    })
            })
            .collect();

        Self {
            vertex,
            bind_layouts,
            pipeline_layouts,
            kernels: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Bind group layout for a given input arity.
    pub(crate) fn layout_for(&self, arity: usize) -> &wgpu::BindGroupLayout {
        &self.bind_layouts[arity]
    }

    /// The contract layout for a kernel sampling `arity` textures:
    /// binding 0 is the output row width, binding 1 the shared sampler,
    /// bindings 2 onward the input textures in order.
    fn bind_group_layout(device: &GpuDevice, arity: usize) -> wgpu::BindGroupLayout {
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ];
        for i in 0..arity {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        device
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("kernel_bindings_{arity}")),
                entries: &entries,
            })
    }

    /// Compile one fragment kernel against the `arity` layout.
    ///
    /// Validation failures (bad WGSL, contract violations) are captured
    /// with an error scope rather than crashing the process; the handle
    /// comes back null and setup aborts once all kernels are compiled.
    pub fn compile(
        &mut self,
        device: &GpuDevice,
        name: &str,
        source: &str,
        arity: usize,
    ) -> KernelId {
        assert!(
            arity <= MAX_KERNEL_INPUTS,
            "kernel `{name}` wants {arity} inputs, contract allows {MAX_KERNEL_INPUTS}"
        );

        device
            .device()
            .push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment = device
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let pipeline = device
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(&self.pipeline_layouts[arity]),
                vertex: wgpu::VertexState {
                    module: &self.vertex,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: 16,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 8,
                                shader_location: 1,
                            },
                        ],
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::R32Float,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

        let error = pollster::block_on(device.device().pop_error_scope());

        let id = KernelId(self.kernels.len() as u32);
        self.names.push(name.to_string());
        match error {
            Some(e) => {
                log::error!("kernel `{name}` failed to compile: {e}");
                self.kernels.push(None);
            }
            None => {
                self.kernels.push(Some(CompiledKernel { pipeline, arity }));
            }
        }
        id
    }

    /// Linked program for a handle, or `None` for a null handle.
    pub(crate) fn get(&self, kernel: KernelId) -> Option<&CompiledKernel> {
        self.kernels.get(kernel.0 as usize)?.as_ref()
    }

    /// Whether the handle refers to a linked program.
    pub fn is_linked(&self, kernel: KernelId) -> bool {
        self.get(kernel).is_some()
    }

    /// Name the handle was compiled under, for diagnostics.
    pub fn name(&self, kernel: KernelId) -> &str {
        self.names
            .get(kernel.0 as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    /// Number of kernels compiled into the registry, null ones included.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// True when nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}
