use thiserror::Error;

/// The wrapper HTML or a generated template cannot be turned into bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("the template should contain at least one closed tag")]
    NoClosedTag,
    #[error("the template should contain one attribute with the value \"{placeholder}\", found {found}")]
    PlaceholderCount {
        placeholder: &'static str,
        found: usize,
    },
    #[error("the template variant {0:?} should be a basic ASCII character")]
    NonAsciiVariant(char),
    #[error("the markup around the bootstrap must stay on one line: {0:?}")]
    LineTerminator(String),
    #[error("only {available} identifiers are left for {needed} bootstrap variables")]
    IdentifiersExhausted { available: usize, needed: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not generate a valid lead-in from this template")]
pub struct LeadInError;

/// A compressor or decompressor collaborator failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CodecError {
    pub message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("could not generate bootstrap")]
    Exhausted,
    #[error("compression failed: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrunchError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    LeadIn(#[from] LeadInError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}
