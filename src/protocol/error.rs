use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("pass {0} not found")]
    PassNotFound(u64),
    #[error("pass {0} has no samples")]
    EmptyPass(u64),
}
