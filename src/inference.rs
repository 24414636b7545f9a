//! Inference engine: one frozen network, one ordered step list.
//!
//! Setup allocates every texture, slices every weight out of the
//! container, compiles every kernel and resolves the step list to
//! handles. A call then uploads the input, replays the steps strictly in
//! program order, and downloads only the graph output. The step order is
//! trusted: it already encodes a topologically sorted dataflow with slot
//! aliasing resolved, so no dependency analysis happens at run time.

use crate::error::{Error, Result};
use crate::plan::NetPlan;
use crate::raster::{KernelId, Raster, TextureId};
use crate::weights::{decode_f32, WeightStore};

/// One resolved dispatch.
struct Step {
    name: String,
    kernel: KernelId,
    output: TextureId,
    inputs: Vec<TextureId>,
}

/// A frozen network bound to a rasterization backend.
///
/// All resources are created by [`Net::setup`] and live until the value
/// is dropped. Calls are synchronous end to end; the only blocking point
/// is the final readback.
///
/// # Example
///
/// ```no_run
/// use texelnet::{GpuRaster, Net, NetPlan, WeightStore};
///
/// let plan = NetPlan::from_json(&std::fs::read_to_string("net.json")?)?;
/// let weights = WeightStore::open("net.safetensors")?;
/// let mut net = Net::setup(GpuRaster::init()?, &plan, &weights)?;
///
/// let input = vec![0u8; 4 * 150528];
/// let logits = net.infer(&input)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Net<R: Raster> {
    raster: R,
    steps: Vec<Step>,
    input: TextureId,
    input_elements: usize,
    output: TextureId,
    output_elements: usize,
}

impl<R: Raster> Net<R> {
    /// Build the network: textures for every slot (weight slots sliced
    /// out of the container), programs for every kernel, steps resolved
    /// to handles.
    ///
    /// Fatal here: an invalid plan, a missing or malformed weight
    /// tensor, and any kernel left without a linked program.
    pub fn setup(mut raster: R, plan: &NetPlan, weights: &WeightStore) -> Result<Self> {
        plan.validate()?;

        let mut textures = Vec::with_capacity(plan.slots.len());
        for slot in &plan.slots {
            let init = match &slot.weight {
                Some(name) => Some(weights.get(name)?),
                None => None,
            };
            textures.push(raster.create_texture(slot.elements, init)?);
        }

        let arities = plan.kernel_arities();
        let kernels: Vec<KernelId> = plan
            .kernels
            .iter()
            .zip(&arities)
            .map(|(spec, &arity)| raster.compile(&spec.name, &spec.source, arity))
            .collect();

        // A null program must never reach a dispatch.
        for (spec, &id) in plan.kernels.iter().zip(&kernels) {
            if !raster.kernel_ok(id) {
                return Err(Error::KernelCompile(spec.name.clone()));
            }
        }

        let steps = plan
            .steps
            .iter()
            .map(|s| Step {
                name: plan.kernels[s.kernel].name.clone(),
                kernel: kernels[s.kernel],
                output: textures[s.output],
                inputs: s.inputs.iter().map(|&i| textures[i]).collect(),
            })
            .collect();

        log::debug!(
            "net ready: {} slots, {} kernels, {} steps",
            plan.slots.len(),
            plan.kernels.len(),
            plan.steps.len()
        );

        Ok(Self {
            raster,
            steps,
            input: textures[plan.input],
            input_elements: plan.slots[plan.input].elements,
            output: textures[plan.output],
            output_elements: plan.slots[plan.output].elements,
        })
    }

    /// Run one forward pass over a little-endian f32 byte buffer.
    pub fn infer(&mut self, input: &[u8]) -> Result<Vec<f32>> {
        let floats = decode_f32(input)?;
        self.infer_f32(&floats)
    }

    /// Run one forward pass over host floats.
    ///
    /// The input texture is rewritten in place (its size never changes),
    /// every step runs in program order, and the output slot comes back
    /// truncated to its logical element count.
    pub fn infer_f32(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_elements {
            return Err(Error::InputSize {
                expected: self.input_elements,
                got: input.len(),
            });
        }

        self.raster.write_texture(self.input, input)?;

        for step in &self.steps {
            log::trace!("running kernel `{}`", step.name);
            self.raster.dispatch(step.kernel, step.output, &step.inputs)?;
        }

        let mut out = self.raster.read_texture(self.output)?;
        out.truncate(self.output_elements);
        Ok(out)
    }

    /// Element count of the external input tensor.
    #[inline]
    pub fn input_elements(&self) -> usize {
        self.input_elements
    }

    /// Element count of the output tensor.
    #[inline]
    pub fn output_elements(&self) -> usize {
        self.output_elements
    }

    /// Number of dispatch steps in the schedule.
    #[inline]
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// The backend, e.g. to read an intermediate slot in tests.
    pub fn raster(&self) -> &R {
        &self.raster
    }

    /// Mutable backend access.
    pub fn raster_mut(&mut self) -> &mut R {
        &mut self.raster
    }
}
