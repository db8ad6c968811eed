pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logger;
pub mod model;
pub mod prediction;
pub mod preprocess;

pub use api::{create_app, AppState};
pub use config::Config;
pub use model::{Classifier, TfModel};
pub use prediction::{Prediction, ScoredLabel, CLASS_NAMES};
