use thiserror::Error;

/// Result type for translation runs.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a translation run.
///
/// Unsupported operators are deliberately *not* an error: they lower to an
/// identity passthrough and are reported as a warning set at the end of the
/// run.
#[derive(Debug, Error)]
pub enum Error {
    /// A source node requires at least one upstream reference and has none.
    #[error("node `{node}` ({op}) is missing a required input")]
    MissingInput { node: String, op: String },

    /// Two nodes would share a name in the target graph.
    #[error("duplicate node name `{0}` in target graph")]
    DuplicateNodeName(String),

    /// A node references a name that does not exist earlier in the graph.
    #[error("node `{node}` references `{input}`, which is not defined before it")]
    ForwardReference { node: String, input: String },

    /// A source configuration the lowering refuses to guess at.
    #[error("node `{node}`: {reason}")]
    Underspecified { node: String, reason: String },

    /// The source description itself is malformed.
    #[error("malformed source model: {0}")]
    MalformedModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode source model: {0}")]
    Json(#[from] serde_json::Error),
}
