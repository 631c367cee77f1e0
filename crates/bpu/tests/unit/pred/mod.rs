/// Commit-path tests (in-order retirement, token release).
pub mod commit;

/// Prediction-path tests (direction, BTB, RAS, indirect interplay).
pub mod predict;
