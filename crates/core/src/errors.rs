use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Terminal outcome of one ask request, as seen by the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AskError {
    #[error("all provider credentials exhausted after {attempts} attempts")]
    AllCredentialsExhausted { attempts: usize },
    #[error("no answer derivable for `{question}`: {cause}")]
    NoAnswerDerivable { question: String, cause: String },
    #[error("{message}")]
    UserFacing { status: u16, message: String },
}

impl AskError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AllCredentialsExhausted { .. } => 500,
            Self::NoAnswerDerivable { .. } => 404,
            Self::UserFacing { status, .. } => *status,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::AllCredentialsExhausted { .. } => {
                "All API keys exhausted or failed. Please check your API quotas.".to_string()
            }
            Self::NoAnswerDerivable { .. } => "Sorry, I am unable to get the results. There may be \
                 no data related to your query, or please make the query clearer with exact \
                 keywords and values."
                .to_string(),
            Self::UserFacing { message, .. } => message.clone(),
        }
    }

    /// Underlying cause kept for diagnostics, when there is one.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::NoAnswerDerivable { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
