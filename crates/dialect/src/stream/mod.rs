//! SSE streaming transcoder.

pub mod decode;
pub mod encode;
pub mod framer;
pub mod transcoder;

pub use framer::SseFramer;
pub use transcoder::Transcoder;
