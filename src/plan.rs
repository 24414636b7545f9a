//! Declarative execution graphs.
//!
//! A [`NetPlan`] is the data an offline tensor-graph compiler emits for
//! one frozen network: the texture slots (with the weight tensor that
//! preloads each, where any), the fragment kernel sources, and the
//! straight-line step list. The runtime never re-plans: the step order
//! already encodes a topologically sorted dataflow with slot aliasing
//! resolved, and [`NetPlan::validate`] only checks that this is actually
//! true before any GPU resource is touched.

use crate::error::{Error, Result};
use crate::raster::MAX_KERNEL_INPUTS;
use serde::{Deserialize, Serialize};

/// One texture slot: a reusable resource holding `elements` floats,
/// optionally preloaded from a named tensor in the weight container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub elements: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

/// One fragment kernel: a display name and its opaque source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
    pub source: String,
}

/// One dispatch: run `kernel` over every texel of slot `output`,
/// sampling `inputs` in binding order. The output slot is never listed
/// among the inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub kernel: usize,
    pub output: usize,
    pub inputs: Vec<usize>,
}

/// A complete frozen-network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetPlan {
    pub slots: Vec<SlotSpec>,
    pub kernels: Vec<KernelSpec>,
    pub steps: Vec<StepSpec>,
    /// Slot rewritten in place with the caller's tensor on every call.
    pub input: usize,
    /// Slot read back after the last step.
    pub output: usize,
}

impl NetPlan {
    /// Parse a plan from its JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Plan(format!("invalid plan JSON: {e}")))
    }

    /// Serialize the plan back to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Input arity of every kernel, derived from the steps that use it.
    ///
    /// Kernels no step uses compile with arity 0.
    pub fn kernel_arities(&self) -> Vec<usize> {
        let mut arities = vec![0usize; self.kernels.len()];
        for step in &self.steps {
            if let Some(a) = arities.get_mut(step.kernel) {
                *a = step.inputs.len();
            }
        }
        arities
    }

    /// Check the structural rules the interpreter relies on.
    ///
    /// Slot contents are only valid from the step that writes them to
    /// the next overwrite, so every step input must be a preloaded
    /// weight, the external input, or the output of an earlier step.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Plan(msg));

        if self.input >= self.slots.len() {
            return fail(format!("input slot {} out of range", self.input));
        }
        if self.output >= self.slots.len() {
            return fail(format!("output slot {} out of range", self.output));
        }
        if self.slots[self.input].weight.is_some() {
            return fail(format!(
                "input slot {} cannot also be weight-initialized",
                self.input
            ));
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.elements == 0 {
                return fail(format!("slot {i} has zero elements"));
            }
        }

        // Seed the set of readable slots, then replay the schedule.
        let mut written: Vec<bool> = self
            .slots
            .iter()
            .map(|s| s.weight.is_some())
            .collect();
        written[self.input] = true;

        let mut arity: Vec<Option<usize>> = vec![None; self.kernels.len()];

        for (i, step) in self.steps.iter().enumerate() {
            if step.kernel >= self.kernels.len() {
                return fail(format!("step {i} names kernel {} out of range", step.kernel));
            }
            if step.output >= self.slots.len() {
                return fail(format!("step {i} writes slot {} out of range", step.output));
            }
            if step.inputs.len() > MAX_KERNEL_INPUTS {
                return fail(format!(
                    "step {i} binds {} inputs, contract allows {MAX_KERNEL_INPUTS}",
                    step.inputs.len()
                ));
            }
            match arity[step.kernel] {
                None => arity[step.kernel] = Some(step.inputs.len()),
                Some(a) if a != step.inputs.len() => {
                    return fail(format!(
                        "kernel `{}` used with {} inputs at step {i} but {a} earlier",
                        self.kernels[step.kernel].name,
                        step.inputs.len()
                    ));
                }
                Some(_) => {}
            }
            for &input in &step.inputs {
                if input >= self.slots.len() {
                    return fail(format!("step {i} reads slot {input} out of range"));
                }
                if input == step.output {
                    return fail(format!("step {i} reads its own output slot {input}"));
                }
                if !written[input] {
                    return fail(format!(
                        "step {i} reads slot {input} before anything wrote it"
                    ));
                }
            }
            written[step.output] = true;
        }

        if !written[self.output] {
            return fail(format!("output slot {} is never written", self.output));
        }

        Ok(())
    }
}
