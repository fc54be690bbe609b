pub mod codec;
pub mod error;
pub mod matcher;
pub mod store;

pub use error::StoreError;
pub use matcher::{FingerprintMatcher, MatchError, MIN_AUTO_TAG_MARGIN};
pub use store::{FingerprintFilter, FingerprintStore};
