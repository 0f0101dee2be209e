//! HTTP clients for the external generation services.
//!
//! One adapter per job kind (image, video, text, speech), all speaking
//! the same submit-then-poll contract expressed by the [`JobClient`]
//! trait. Adapters are stateless: every method is a network call and
//! nothing is cached locally. Provider-specific status vocabularies are
//! folded into the fixed [`RemoteStatus`] set in [`status`].

pub mod client;
pub mod error;
mod http;
pub mod image;
pub mod speech;
pub mod status;
pub mod text;
pub mod video;

pub use client::{JobClient, PollResponse};
pub use error::ProviderError;
pub use image::ImageClient;
pub use speech::SpeechClient;
pub use status::RemoteStatus;
pub use text::TextClient;
pub use video::VideoClient;
