use thiserror::Error;

use crate::source::{Site, Source};

/// The compile-time failure taxonomy. The first error aborts the pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("syntax error at {site}: {msg}")]
    Syntax { site: Site, msg: String },
    #[error("type error at {site}: {msg}")]
    Type { site: Site, msg: String },
    #[error("reference error at {site}: {msg}")]
    Reference { site: Site, msg: String },
}

impl CompileError {
    pub fn syntax<M: Into<String>>(site: Site, msg: M) -> Self {
        CompileError::Syntax {
            site,
            msg: msg.into(),
        }
    }

    pub fn type_<M: Into<String>>(site: Site, msg: M) -> Self {
        CompileError::Type {
            site,
            msg: msg.into(),
        }
    }

    pub fn reference<M: Into<String>>(site: Site, msg: M) -> Self {
        CompileError::Reference {
            site,
            msg: msg.into(),
        }
    }

    pub fn site(&self) -> Site {
        match self {
            CompileError::Syntax { site, .. }
            | CompileError::Type { site, .. }
            | CompileError::Reference { site, .. } => *site,
        }
    }

    pub fn msg(&self) -> &str {
        match self {
            CompileError::Syntax { msg, .. }
            | CompileError::Type { msg, .. }
            | CompileError::Reference { msg, .. } => msg,
        }
    }

    /// Render against the source the site points into.
    pub fn describe(&self, source: &Source) -> String {
        format!("{}: {}", source.describe(self.site()), self)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
