//! Voice collaborators: speech-to-text for incoming voice notes, text-to-speech for replies.

mod stt;
mod tts;

pub use stt::{GroqTranscriber, Transcriber};
pub use tts::{GoogleTts, SpeechSynthesizer};
