//! Game session: move history, mode state machine and engine scheduling.

pub mod error;
pub mod history;
pub mod orchestrator;
pub mod settings;
pub mod snapshot;

pub use error::SessionError;
pub use history::{MoveHistoryManager, Rewind, MAX_MOVE_HISTORY_LENGTH};
pub use orchestrator::{SessionCommand, SessionHandle, SessionOrchestrator};
pub use settings::{strength, Mode, SessionTimings, Settings, Strength, MAX_AI_LEVEL, STRENGTH_LEVELS};
pub use snapshot::{SessionEvent, SessionSnapshot};
