pub mod prediction;

pub use prediction::{GenrePredictor, PredictionClient, PredictionClientConfig, PredictionError};
