pub mod database;
pub mod decision;
pub mod history;
pub mod metrics;
pub mod model;
pub mod preprocess;

pub use database::MongoHistoryStore;
pub use decision::{decide, DecisionOutcome};
pub use history::{HistoryError, HistoryStore, InMemoryHistoryStore};
pub use self::metrics::{get_metrics, init_metrics};
pub use model::{Classifier, InferenceOutput, ModelError, ModelProvider, TractModelProvider};
pub use preprocess::{InferenceInput, PreprocessError};
