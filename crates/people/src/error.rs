use thiserror::Error;

pub type Result<T> = std::result::Result<T, PeopleError>;

#[derive(Error, Debug)]
pub enum PeopleError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] lumina_catalog::CatalogError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}
