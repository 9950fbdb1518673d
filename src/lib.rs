pub mod condition;
pub mod error;
pub mod obs;
pub mod options;
pub mod query;
pub mod util;

pub use crate::condition::{Condition, ConditionState};
pub use crate::error::{Error, Result};
pub use crate::options::options::{OptimizationMode, OptimizerOptions};
