pub mod message;
pub mod categorize;
pub mod composite;
pub mod extraction;
pub mod validation;
pub mod progress;
pub mod transport;
pub mod error;
pub mod stage;

pub use error::StageError;
pub use message::{DocumentMessage, ProcessingStatus, Stage};
pub use stage::StagePipeline;
