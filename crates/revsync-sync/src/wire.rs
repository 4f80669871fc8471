//! Wire vocabulary: tags, commands and size limits.

use std::fmt;

use crate::error::SyncError;

/// Message size limits.
pub mod limits {
    /// Max bytes in one transport frame.
    pub const MAX_FRAME_LEN: usize = 1 << 20;
    /// Default big-buffer chunk size.
    pub const DEFAULT_CHUNK_SIZE: usize = 128;
    /// Default cap on a declared big-buffer length.
    pub const DEFAULT_MAX_BUFFER_LEN: u64 = 256 << 20;
}

/// One-byte message tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// "Do you have commit X?" probe; a digest frame follows.
    Sha = 1,
    Pull = 2,
    Push = 3,
    Clone = 4,
    Stop = 5,
    Ok = 6,
    NotOk = 7,
    /// Push rejected, nothing changed.
    DoNothing = 8,
    /// Fast-forward precondition violated.
    NeedPull = 9,
}

impl Tag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Tag {
    type Error = SyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Tag::Sha,
            2 => Tag::Pull,
            3 => Tag::Push,
            4 => Tag::Clone,
            5 => Tag::Stop,
            6 => Tag::Ok,
            7 => Tag::NotOk,
            8 => Tag::DoNothing,
            9 => Tag::NeedPull,
            other => return Err(SyncError::Protocol(format!("unknown tag {}", other))),
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A request the server dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Push,
    Pull,
    Clone,
    Stop,
}

impl TryFrom<Tag> for Command {
    type Error = SyncError;

    fn try_from(tag: Tag) -> Result<Self, Self::Error> {
        match tag {
            Tag::Push => Ok(Command::Push),
            Tag::Pull => Ok(Command::Pull),
            Tag::Clone => Ok(Command::Clone),
            Tag::Stop => Ok(Command::Stop),
            other => Err(SyncError::Protocol(format!("{} is not a command", other))),
        }
    }
}

impl From<Command> for Tag {
    fn from(command: Command) -> Self {
        match command {
            Command::Push => Tag::Push,
            Command::Pull => Tag::Pull,
            Command::Clone => Tag::Clone,
            Command::Stop => Tag::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_codes_are_stable() {
        for code in 1u8..=9 {
            let tag = Tag::try_from(code).unwrap();
            assert_eq!(tag.as_u8(), code);
        }
        assert!(Tag::try_from(0).is_err());
        assert!(Tag::try_from(10).is_err());
    }

    #[test]
    fn test_only_requests_are_commands() {
        assert_eq!(Command::try_from(Tag::Pull).unwrap(), Command::Pull);
        assert_eq!(Tag::from(Command::Stop), Tag::Stop);
        assert!(matches!(Command::try_from(Tag::Sha), Err(SyncError::Protocol(_))));
        assert!(Command::try_from(Tag::Ok).is_err());
    }
}
