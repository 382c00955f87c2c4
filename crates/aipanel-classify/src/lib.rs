pub mod classifier;
pub mod rejection;

pub use classifier::{Classifier, Decision, RuleId};
pub use rejection::{
    ApplicationOutcome, Extraction, PatternId, RejectionExtractor, UnknownCause, primary_outcomes,
};
