/// Data shaping between the provider client and the engine.
///
/// Submodules:
/// - `normalize`: collapses multi-column provider tables to one value per
///   site and timestamp.
/// - `reduce`: per-site latest values, window totals and resampled bins.

pub mod normalize;
pub mod reduce;
