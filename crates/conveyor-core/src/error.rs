use thiserror::Error;

use crate::app::builder::BuildError;
use crate::config::ConfigError;
use crate::domain::{HandlerError, StoreError, TransportError, UnknownTaskError};
use crate::typed::RegistryError;

/// Any failure surfaced by the crate, for callers that do not care which
/// layer it came from.
#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    UnknownTask(#[from] UnknownTaskError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
