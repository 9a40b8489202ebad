// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NvrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration store error: {0}")]
    Store(String),

    #[error("GStreamer error: {0}")]
    GStreamer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline build failed at stage '{stage}': {cause}")]
    PipelineBuildFailed { stage: String, cause: String },

    #[error("camera '{id}' connection failed: {reason}")]
    CameraConnection { id: String, reason: String },

    #[error("camera '{id}' not found")]
    CameraNotFound { id: String },

    #[error("camera '{id}' already exists")]
    CameraDuplicate { id: String },
}

pub type Result<T> = std::result::Result<T, NvrError>;
