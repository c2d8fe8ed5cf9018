use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("version conflict writing {name}")]
    Conflict { name: String },

    #[error("publishing TenantInfo for tenant {tenant} gave up after {attempts} conflicting attempts")]
    PublishExhausted { tenant: String, attempts: u32 },

    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
