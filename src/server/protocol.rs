//! Chat command protocol
//!
//! Client lines are whitespace-tokenized; the first token names the command.
//! Server replies are fixed plain-text lines, collected in [`reply`].

use thiserror::Error;

/// Longest accepted user ID, in bytes
pub const MAX_USER_ID_LEN: usize = 32;

/// Longest accepted `send` body, in bytes
pub const MAX_MESSAGE_LEN: usize = 256;

/// Recipient token that addresses every other logged-in user
pub const BROADCAST_TOKEN: &str = "all";

/// Target of a `send` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    All,
    User(String),
}

impl Recipient {
    pub fn parse(token: &str) -> Self {
        if token == BROADCAST_TOKEN {
            Self::All
        } else {
            Self::User(token.to_string())
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::All => write!(f, "{}", BROADCAST_TOKEN),
            Recipient::User(user_id) => write!(f, "{}", user_id),
        }
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { user_id: String, password: String },
    NewUser { user_id: String, password: String },
    Who,
    Send { recipient: Recipient, message: String },
    Logout,
    /// Anything else, including blank lines; ignored without a reply
    Unknown(String),
}

/// Malformed input for a known command. The message is the reply line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Denied. Usage: {usage}")]
    Usage { usage: &'static str },

    #[error("Denied. User ID exceeds {max} bytes.")]
    UserIdTooLong { max: usize },

    #[error("Denied. User ID may not contain ',', '(' or ')'.")]
    ReservedCharacter,

    #[error("Denied. Message exceeds {max} bytes.")]
    MessageTooLong { max: usize },

    #[error("Denied. Line exceeds {max} bytes.")]
    LineTooLong { max: usize },
}

const LOGIN_USAGE: &str = "login <userID> <password>";
const NEWUSER_USAGE: &str = "newuser <userID> <password>";
const SEND_USAGE: &str = "send <recipient|all> <message>";

/// Split off the first whitespace-delimited token
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

fn check_user_id(user_id: &str) -> Result<(), ProtocolError> {
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(ProtocolError::UserIdTooLong {
            max: MAX_USER_ID_LEN,
        });
    }
    Ok(())
}

/// Credential records are `(<userID>, <password>)`, so these bytes cannot
/// appear in a user ID that has to be read back
fn check_storable(user_id: &str) -> Result<(), ProtocolError> {
    if user_id.contains([',', '(', ')']) {
        return Err(ProtocolError::ReservedCharacter);
    }
    Ok(())
}

fn credentials(args: &str, usage: &'static str) -> Result<(String, String), ProtocolError> {
    let (user_id, rest) = next_token(args).ok_or(ProtocolError::Usage { usage })?;
    let (password, _) = next_token(rest).ok_or(ProtocolError::Usage { usage })?;
    check_user_id(user_id)?;
    Ok((user_id.to_string(), password.to_string()))
}

impl Command {
    /// Parse one protocol line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let Some((name, args)) = next_token(line) else {
            return Ok(Command::Unknown(String::new()));
        };

        match name {
            "login" => {
                let (user_id, password) = credentials(args, LOGIN_USAGE)?;
                Ok(Command::Login { user_id, password })
            }
            "newuser" => {
                let (user_id, password) = credentials(args, NEWUSER_USAGE)?;
                check_storable(&user_id)?;
                Ok(Command::NewUser { user_id, password })
            }
            "who" => Ok(Command::Who),
            "logout" => Ok(Command::Logout),
            "send" => {
                let (recipient, rest) = next_token(args).ok_or(ProtocolError::Usage {
                    usage: SEND_USAGE,
                })?;
                // The body keeps its internal spacing; only the separator goes
                let message = rest.trim_start();
                if message.is_empty() {
                    return Err(ProtocolError::Usage { usage: SEND_USAGE });
                }
                if message.len() > MAX_MESSAGE_LEN {
                    return Err(ProtocolError::MessageTooLong {
                        max: MAX_MESSAGE_LEN,
                    });
                }
                let recipient = Recipient::parse(recipient);
                if let Recipient::User(ref user_id) = recipient {
                    check_user_id(user_id)?;
                }
                Ok(Command::Send {
                    recipient,
                    message: message.to_string(),
                })
            }
            other => Ok(Command::Unknown(other.to_string())),
        }
    }

    /// Command name for logging
    pub fn name(&self) -> &str {
        match self {
            Command::Login { .. } => "login",
            Command::NewUser { .. } => "newuser",
            Command::Who => "who",
            Command::Send { .. } => "send",
            Command::Logout => "logout",
            Command::Unknown(name) => name,
        }
    }
}

/// Fixed server reply lines and notice builders
pub mod reply {
    pub const LOGIN_CONFIRMED: &str = "login confirmed.";
    pub const ACCOUNT_CREATED: &str = "New user account created. Please login.";
    pub const SERVER_FULL: &str =
        "Maximum number of clients already connected to server. Please try again later.";

    /// Notice sent to other users after a login
    pub fn joins(user_id: &str) -> String {
        format!("{} joins.", user_id)
    }

    /// Notice sent to other users after a logout or disconnect
    pub fn left(user_id: &str) -> String {
        format!("{} left.", user_id)
    }

    /// Chat line as delivered to recipients
    pub fn chat(sender: &str, message: &str) -> String {
        format!("{}: {}", sender, message)
    }
}
