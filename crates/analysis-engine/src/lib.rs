//! UCI engine session: handshake, search requests, streamed observations.

pub mod config;
pub mod error;
pub mod observation;
pub mod port;
pub mod protocol;
pub mod session;

pub use config::EngineConfig;
pub use error::EngineError;
pub use observation::{EngineObservation, Score, MAX_CENTIPAWN_EVAL};
pub use port::{AnalysisEngine, BestMove, OfflineEngine};
pub use session::{EngineRequest, EngineSession, EngineState, RequestKind};
