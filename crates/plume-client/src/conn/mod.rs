//! Concrete framed-connection variants.
//!
//! Both implement the [`FrameReader`]/[`FrameWriter`] capability traits from
//! `plume-core`; the transport session depends only on those traits.
//!
//! [`FrameReader`]: plume_core::FrameReader
//! [`FrameWriter`]: plume_core::FrameWriter

pub mod tcp;
pub mod websocket;

/// Frames larger than this are rejected by both variants.
pub(crate) const MAX_FRAME_SIZE: usize = 1_048_576;
