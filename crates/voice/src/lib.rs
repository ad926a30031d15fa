//! Voice support for the inbox: transcription of inbound voice notes and
//! synthesis of spoken replies.
//!
//! Both providers speak the OpenAI audio API and are optional at runtime.
//! When no API key is configured the gateway simply skips the voice path,
//! so every entry point here is written to degrade rather than fail the
//! conversation.

mod media;
mod stt;
mod tts;

pub use {
    media::{AudioReplyStore, DEFAULT_REPLY_TTL},
    stt::{Transcriber, WhisperTranscriber, attachment_file_name},
    tts::{MAX_SPEECH_CHARS, OpenAiSynthesizer, SpeechSynthesizer, trim_for_speech},
};
