use thiserror::Error;

/// Failure taxonomy for the patent pipeline. Every variant maps to a literal
/// diagnostic string via [`PatentError::user_message`]; the chat flow returns
/// that text in place of an answer instead of bubbling the error to the
/// transport layer.
#[derive(Debug, Error)]
pub enum PatentError {
    #[error("no application number provided")]
    NoIdentifier,

    #[error("invalid application number: {0}")]
    InvalidIdentifier(String),

    #[error("no patent record found for {0}")]
    NotFound(String),

    #[error("could not parse column selection reply: {0}")]
    ParseFailure(String),

    #[error("no question provided")]
    NoQuestion,

    #[error("upstream service failure: {0}")]
    Upstream(String),
}

impl PatentError {
    pub fn user_message(&self) -> String {
        match self {
            PatentError::NoIdentifier => "No application number provided".to_string(),
            PatentError::InvalidIdentifier(_) => "Invalid application number".to_string(),
            PatentError::NotFound(identifier) => {
                format!("No patent record found for {identifier}")
            }
            PatentError::ParseFailure(_) => {
                "Could not determine which record fields answer this question".to_string()
            }
            PatentError::NoQuestion => "No question provided".to_string(),
            PatentError::Upstream(_) => {
                "Upstream service is unavailable, try again later".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_are_literal_strings() {
        assert_eq!(
            PatentError::NoIdentifier.user_message(),
            "No application number provided"
        );
        assert_eq!(
            PatentError::InvalidIdentifier("12".to_string()).user_message(),
            "Invalid application number"
        );
        assert_eq!(PatentError::NoQuestion.user_message(), "No question provided");
    }

    #[test]
    fn not_found_names_the_identifier() {
        let message = PatentError::NotFound("12345678".to_string()).user_message();
        assert!(message.contains("12345678"));
    }
}
