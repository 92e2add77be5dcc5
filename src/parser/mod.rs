pub mod ai;
pub mod gazetteer;
pub mod hybrid;
pub mod rules;

pub use ai::{AiExtractor, AiListingFields, OpenAiExtractor};
pub use hybrid::HybridParser;
pub use rules::RuleParser;
