// Clip audio: symphonia decoding, rubato conversion and cpal output

pub mod convert;
pub mod decoder;
pub mod output;

pub use decoder::{decode, DecodeError, Pcm};
pub use output::{AudioSink, CpalSink, NullSink, OutputError, Playback};
