use std::path::Path;

use ndarray::Array4;
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use thiserror::Error;
use tracing::info;

use crate::prediction::CLASS_NAMES;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("could not read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("tensorflow: {0}")]
    Tensorflow(String),

    #[error("model returned {actual} scores, expected {expected}")]
    OutputLength { expected: usize, actual: usize },
}

impl From<tensorflow::Status> for ModelError {
    fn from(status: tensorflow::Status) -> Self {
        ModelError::Tensorflow(status.to_string())
    }
}

/// Anything that maps a preprocessed `[1, 224, 224, 3]` batch to per-class scores.
pub trait Classifier: Send + Sync {
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Frozen TensorFlow graph, loaded once and shared across requests.
pub struct TfModel {
    session: Session,
    graph: Graph,
    input_op: String,
    output_op: String,
}

impl TfModel {
    pub fn load(model_path: &Path, input_op: &str, output_op: &str) -> Result<Self, ModelError> {
        let model_bytes = std::fs::read(model_path)?;

        let mut graph = Graph::new();
        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        // Fail at startup rather than on the first request.
        graph.operation_by_name_required(input_op)?;
        graph.operation_by_name_required(output_op)?;

        let session = Session::new(&SessionOptions::new(), &graph)?;

        info!(
            path = %model_path.display(),
            input_op,
            output_op,
            "loaded frozen graph"
        );

        Ok(TfModel {
            session,
            graph,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }
}

impl Classifier for TfModel {
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let dims: Vec<u64> = input.shape().iter().map(|&d| d as u64).collect();
        let values: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::new(&dims).with_values(&values)?;

        let input_operation = self.graph.operation_by_name_required(&self.input_op)?;
        let output_operation = self.graph.operation_by_name_required(&self.output_op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        let scores = output_tensor.to_vec();

        if scores.len() != CLASS_NAMES.len() {
            return Err(ModelError::OutputLength {
                expected: CLASS_NAMES.len(),
                actual: scores.len(),
            });
        }

        Ok(scores)
    }
}
