use player_engine::EngineError;
use std::fmt;

/// Errors reported by the player outside the render thread.
#[derive(Debug)]
pub enum PlayerError {
    /// The control bridge is not running.
    NotRunning,
    /// The worker thread could not be spawned.
    Spawn(std::io::Error),
    /// The worker thread panicked.
    WorkerPanicked,
    Engine(EngineError),
    /// Persisted state could not be decoded.
    State(String),
    Io(std::io::Error),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::NotRunning => write!(f, "Control bridge is not running"),
            PlayerError::Spawn(e) => write!(f, "Failed to spawn worker thread: {}", e),
            PlayerError::WorkerPanicked => write!(f, "Worker thread panicked"),
            PlayerError::Engine(e) => write!(f, "Engine error: {}", e),
            PlayerError::State(reason) => write!(f, "Invalid player state: {}", reason),
            PlayerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlayerError::Spawn(e) | PlayerError::Io(e) => Some(e),
            PlayerError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for PlayerError {
    fn from(e: EngineError) -> Self {
        PlayerError::Engine(e)
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(e: std::io::Error) -> Self {
        PlayerError::Io(e)
    }
}
