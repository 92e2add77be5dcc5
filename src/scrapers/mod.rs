pub mod feed;
pub mod traits;

pub use feed::GroupFeedExtractor;
pub use traits::PostSource;
