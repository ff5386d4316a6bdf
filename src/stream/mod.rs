//! Stream adapters for consumers that render at their own pace

mod coalesce;

pub use coalesce::{Coalesce, CoalesceExt};
