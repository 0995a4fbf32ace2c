/// Pure computations over resolved station data.
///
/// Nothing here performs I/O; every function is deterministic over its
/// inputs, which keeps the scoring and center logic testable without a
/// provider.
///
/// Submodules:
/// - `anomaly` — robust (median/MAD) outlier score for a station's history.
/// - `center` — map focal point from a station set.

pub mod anomaly;
pub mod center;
