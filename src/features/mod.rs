// Feature extraction for the learned classifier

pub mod tensor;

pub use tensor::{build, FeatureTensor, TensorConfig, TensorError};
