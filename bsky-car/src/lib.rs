//! Reading and writing [car](https://ipld.io/specs/transport/car/carv1/) v1 bundles.
//!
//! A bundle is a dag-cbor header naming its root CIDs, followed by frames of
//! `varint(len) cid data`. Readers and writers work frame by frame over tokio IO, so a
//! bundle is never held in memory as a whole.

mod error;
mod frame;
mod header;
mod reader;
mod writer;

pub use crate::error::Error;
pub use crate::frame::MAX_FRAME_SIZE;
pub use crate::header::CarHeader;
pub use crate::reader::CarReader;
pub use crate::writer::CarWriter;

/// Content type of a bundle served over HTTP.
pub const MIME_TYPE: &str = "application/vnd.ipld.car";
