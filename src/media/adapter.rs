// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The source branches on the media framework's runtime version string at
//! many call sites. This crate instead puts every framework touchpoint
//! behind one trait; the rest of the engine only ever sees `MediaAdapter`,
//! never a concrete GStreamer type, so a future backing version (or a
//! second framework) is a second impl of this trait, not a sweep of
//! `if version >= ...` checks through the pipeline factory.

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::error::{NvrError, Result};

/// Abstraction over the underlying media framework's element factory and
/// initialization surface. The pipeline factory (§4.1) is the only module
/// that builds elements; it does so exclusively through this trait.
pub trait MediaAdapter: Send + Sync {
    /// Initializes the framework. Safe to call more than once.
    fn init(&self) -> Result<()>;

    /// True if an element factory of this name is registered and loadable.
    fn has_factory(&self, factory_name: &str) -> bool;

    /// Builds a named element, or `PipelineBuildFailed` if the factory is
    /// missing or refuses to instantiate.
    fn make_element(&self, factory_name: &str, name: &str, stage: &str) -> Result<gst::Element>;
}

/// The GStreamer 1.x backing implementation. Stateless: every method is a
/// thin, fallible wrapper over `gstreamer-rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gst1Adapter;

impl Gst1Adapter {
    pub fn new() -> Self {
        Self
    }
}

impl MediaAdapter for Gst1Adapter {
    fn init(&self) -> Result<()> {
        gst::init().map_err(|e| NvrError::GStreamer(e.to_string()))
    }

    fn has_factory(&self, factory_name: &str) -> bool {
        gst::ElementFactory::find(factory_name).is_some()
    }

    fn make_element(&self, factory_name: &str, name: &str, stage: &str) -> Result<gst::Element> {
        gst::ElementFactory::make(factory_name)
            .name(name)
            .build()
            .map_err(|e| NvrError::PipelineBuildFailed {
                stage: stage.to_string(),
                cause: format!("factory '{factory_name}': {e}"),
            })
    }
}
