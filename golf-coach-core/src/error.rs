use thiserror::Error;

#[derive(Error, Debug)]
pub enum GolfCoachError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
