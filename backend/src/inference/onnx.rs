use std::path::Path;

use ndarray::ArrayView1;
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// A graph with one `[1, n_features]` f32 input whose output `output` holds
/// one score per class, e.g. logits or probabilities.
pub(crate) struct OnnxScorer {
    plan: Plan,
    n_features: usize,
    output: usize,
}

impl OnnxScorer {
    pub(crate) fn load(graph_path: &Path, n_features: usize, output: usize) -> TractResult<Self> {
        let input = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, n_features));
        let plan = tract_onnx::onnx()
            .model_for_path(graph_path)?
            .with_input_fact(0, input)?
            .into_optimized()?
            .into_runnable()?;

        let outputs = plan.model().output_outlets()?.len();
        if output >= outputs {
            anyhow::bail!("graph has {} output(s), manifest selects #{}", outputs, output);
        }

        Ok(Self {
            plan,
            n_features,
            output,
        })
    }

    pub(crate) fn scores(&self, row: ArrayView1<'_, f64>) -> TractResult<Vec<f32>> {
        let input: Tensor =
            tract_ndarray::Array2::from_shape_fn((1, self.n_features), |(_, j)| row[j] as f32)
                .into();
        let outputs = self.plan.run(tvec!(input.into()))?;
        let scores = outputs[self.output].to_array_view::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}
