use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuestionError>;

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("question already exists")]
    AlreadyExists,
    #[error("question not found")]
    NotFound,
    #[error("question deleted")]
    Deleted,
    #[error("question already deleted")]
    AlreadyDeleted,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("corrupt snapshot: {0}")]
    Decode(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for QuestionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for QuestionError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for QuestionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl IntoResponse for QuestionError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists | Self::AlreadyDeleted => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Deleted => StatusCode::GONE,
            Self::Storage(_) | Self::Decode(_) | Self::Serialization(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = self.to_string();
        (status, Json(ErrorBody { message: &message })).into_response()
    }
}
