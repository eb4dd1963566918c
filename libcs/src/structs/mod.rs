pub mod record;

pub mod sequence;
pub use sequence::Sequence;

pub mod count_profile;
pub use count_profile::CountProfile;

pub mod context_profile;
pub use context_profile::ContextProfile;

pub mod library;
pub use library::ContextLibrary;

pub mod crf;
pub use crf::{Crf, CrfState};
