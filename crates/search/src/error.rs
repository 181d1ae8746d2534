use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] lumina_catalog::CatalogError),

    #[error("Similarity error: {0}")]
    Similarity(#[from] lumina_similarity::SimilarityError),

    #[error("Empty query")]
    EmptyQuery,

    #[error("Invalid fusion weights: {0}")]
    InvalidWeights(String),
}
