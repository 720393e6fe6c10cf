use std::path::PathBuf;

use thiserror::Error;

use crate::slot::SlotState;

/// Library error type for pan-zoom-frame operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured photo directory is missing or unreadable.
    #[error("invalid photo directory: {0}")]
    BadDir(String),

    /// The catalog was built but holds no images.
    #[error("no images found in the catalog")]
    EmptyCatalog,

    /// An image could not be opened or decoded.
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// A source row was fed to the vertical scaler out of order.
    #[error("source row {got} fed out of order (expected {expected})")]
    RowOutOfOrder { expected: usize, got: usize },

    /// Rows were fed to the vertical scaler before `begin_image`.
    #[error("vertical scaler has no image set up")]
    ScalerNotReady,

    /// A destination row needed a source row that is no longer buffered.
    #[error("source row {0} is not resident in the row buffer")]
    RowNotResident(usize),

    /// A slot was asked to move along an edge its current state does not allow.
    #[error("slot {slot} cannot move from {from:?} to {to:?}")]
    SlotTransition {
        slot: usize,
        from: SlotState,
        to: SlotState,
    },

    /// Work was abandoned because shutdown was requested.
    #[error("cancelled")]
    Cancelled,

    /// Tile texture creation or upload failed on the graphics device.
    #[error("graphics device error: {0}")]
    Device(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
