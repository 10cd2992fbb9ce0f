pub mod action;
pub mod decision;
pub mod definition;
pub mod direction;
pub mod request;

pub use action::Action;
pub use decision::Decision;
pub use definition::{RuleDef, RuleDocument, SuppressionDef, DEFAULT_CLASSIFIER};
pub use direction::Direction;
pub use request::EvaluationRequest;
