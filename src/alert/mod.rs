/// Status classification for reduced site values.
///
/// Submodules:
/// - `thresholds` - ordered threshold tables and the classifier that picks
///   a table per measurement (and optionally per site).

pub mod thresholds;
