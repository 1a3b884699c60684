use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}")]
    ActionFailed { command: String, code: i32 },

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StackError {
    /// Exit code the process should terminate with when this error aborts a command.
    pub fn exit_code(&self) -> i32 {
        match self {
            StackError::ActionFailed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
