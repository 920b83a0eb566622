use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("firmware link is down")]
    Disconnected,
}
