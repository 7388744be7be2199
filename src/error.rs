//! Error types.
//!
//! Each concern gets its own enum so callers can match on exactly what they
//! can act on:
//!
//! - [`ConfigurationError`] - bad construction input (fatal)
//! - [`SubscriptionError`] - bad `on()` call (fatal)
//! - [`TreeError`] - illegal tree mutation
//! - [`MarkupError`] - malformed markup fragment
//! - [`HandlerError`] - whatever a handler returns; logged, never propagated

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by event handlers.
///
/// Handler failures are recovered by the dispatcher: logged with the event
/// type and never surfaced to the code that mutated the tree.
pub type HandlerError = Box<dyn std::error::Error>;

/// What a handler returns.
pub type HandlerResult = std::result::Result<(), HandlerError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Markup(#[from] MarkupError),
}

/// Invalid input at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// The root handle is not an element node.
    #[error("root must be an element node")]
    InvalidRoot,

    /// The key attribute name is missing or blank.
    #[error("options.key is required")]
    MissingKey,

    /// Options could not be decoded.
    #[error("invalid options: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Invalid subscription request.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("invalid event \"{0}\". Must be one of: add, remove, change")]
    InvalidEvent(String),

    #[error("cannot subscribe after disconnect")]
    Disconnected,
}

/// Illegal structural or attribute mutation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    /// Inserting the node would create a cycle, or the parent cannot hold children.
    #[error("hierarchy request: {0}")]
    HierarchyRequest(&'static str),

    /// The node passed as child (or reference child) is not a child of the parent.
    #[error("node is not a child of this node")]
    NotFound,

    /// Attributes only exist on element nodes.
    #[error("attributes are only supported on element nodes")]
    NotAnElement,
}

/// Malformed markup, with the byte offset where parsing stopped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("invalid tag name at byte {0}")]
    InvalidTagName(usize),

    #[error("closing tag </{found}> at byte {offset} does not match <{expected}>")]
    MismatchedClose {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("closing tag </{found}> at byte {offset} has no open element")]
    UnexpectedClose { found: String, offset: usize },

    #[error("unclosed element <{0}>")]
    Unclosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_messages() {
        assert_eq!(
            SubscriptionError::Disconnected.to_string(),
            "cannot subscribe after disconnect"
        );
        let msg = SubscriptionError::InvalidEvent("click".into()).to_string();
        assert!(msg.contains("invalid event"));
        assert!(msg.contains("\"click\""));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: Error = ConfigurationError::MissingKey.into();
        assert!(matches!(err, Error::Configuration(ConfigurationError::MissingKey)));
        assert_eq!(err.to_string(), "options.key is required");
    }
}
