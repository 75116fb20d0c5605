#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpsError {
    #[error("buffer holds {actual} bytes, operation needs {expected}")]
    BufferLength { expected: usize, actual: usize },
    #[error("session is powered off")]
    NotStarted,
    #[error("no data from receiver before the read timeout")]
    Timeout,
    #[error("no matching sentence within the scan limit")]
    SentenceNotFound,
    #[error("no fix after {attempts} checks")]
    NoFix { attempts: u8 },
    #[error("serial transport fault")]
    Transport,
    #[error("power control pin fault")]
    Power,
}

pub type Result<T> = core::result::Result<T, GpsError>;
