#![allow(dead_code)]

//! Adaptive bitrate estimation and media buffer bookkeeping for streaming players.
//!
//! The `adaptive` module chooses, from playback observations and network metrics, the
//! Representation which should be loaded. The `segment_sink` module keeps track of which
//! segments are actually present in each media buffer.

use wasm_bindgen::prelude::*;

pub mod adaptive;
mod bindings;
pub mod configuration;
pub mod content;
pub mod observation;
pub mod segment_sink;
pub mod utils;

pub use adaptive::{
    AbrCallbacks, AbrEstimate, AbrFilters, AdaptiveRepresentationSelector,
    AdaptiveSelectorOptions, EstimateContext, EstimateReference,
};
pub use configuration::Configuration;
pub use segment_sink::{
    BufferGarbageCollector, SegmentInventory, SegmentSink, SourceBufferSink,
};
pub use utils::logger::Logger;
