mod rate_limited_client_extractor;
mod validation_extractor;

pub use rate_limited_client_extractor::*;
pub use validation_extractor::*;
