use thiserror::Error;

use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] msgchain_ledger::LedgerError),

    #[error("cipher error: {0}")]
    Cipher(#[from] msgchain_crypto::CipherError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("config error: {0}")]
    Config(String),

    #[error("key file error: {0}")]
    KeyFile(String),

    #[error("logging init error: {0}")]
    Logging(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,
}
