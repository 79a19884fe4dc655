//! External collaborator interfaces (demuxer, speech recognizer, text
//! enhancer) used by `pipeflow-executor`'s operation handlers. Every
//! collaborator is a trait so the executor can be driven by real
//! subprocess/HTTP-backed implementations or deterministic mocks.

pub mod demuxer;
pub mod enhancer;
pub mod error;
pub mod recognizer;

pub use demuxer::Demuxer;
pub use demuxer::FfmpegDemuxer;
pub use demuxer::MockDemuxer;
pub use enhancer::Enhancement;
pub use enhancer::Enhancer;
pub use enhancer::LlmEnhancer;
pub use enhancer::MockEnhancer;
pub use error::CollabError;
pub use error::CollabResult;
pub use recognizer::CloudRecognizer;
pub use recognizer::FallbackRecognizer;
pub use recognizer::LocalRecognizer;
pub use recognizer::MockRecognizer;
pub use recognizer::Recognizer;
pub use recognizer::Transcript;
