pub mod pair;
pub use pair::{sample_windows, TrainingPair};

pub mod func;
pub use func::{ContextLibFunc, CrfFunc, CrfFuncEval, DerivCrfFunc, TrainingBlock};

pub mod em;
pub use em::{Clustering, ClusteringOutcome, ClusteringParams, Subject};

pub mod lbfgs;
pub use lbfgs::{train_lbfgs, CrfTrainOutcome, LbfgsParams};

pub mod hmc;
pub use hmc::{train_hmc, HmcParams};
