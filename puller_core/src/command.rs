//! Line-oriented command interpreter.
//!
//! A line is a lowercase keyword (`[a-z_]+`) optionally followed by an
//! integer argument, e.g. `move_to_position10` or `move_to_force 25`. The
//! keyword must match an entry of `TABLE` exactly, so `open` never swallows
//! `open_until_break`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open,
    Close,
    Stop,
    /// Absolute target in mm.
    MoveToPosition(i32),
    /// Target force in newtons.
    MoveToForce(i32),
    Home,
    OpenUntilBreak,
    /// Anything unrecognized; carries the trimmed input.
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
enum Keyword {
    Open,
    Close,
    Stop,
    MoveToPosition,
    MoveToForce,
    Home,
    OpenUntilBreak,
}

impl Keyword {
    fn takes_int(self) -> bool {
        matches!(self, Keyword::MoveToPosition | Keyword::MoveToForce)
    }
}

const TABLE: &[(&str, Keyword)] = &[
    ("open", Keyword::Open),
    ("close", Keyword::Close),
    ("stop", Keyword::Stop),
    ("move_to_position", Keyword::MoveToPosition),
    ("move_to_force", Keyword::MoveToForce),
    ("home", Keyword::Home),
    ("open_until_break", Keyword::OpenUntilBreak),
];

/// Decode one line. Never panics; anything unrecognized is `Command::Invalid`.
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    let split = line
        .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
        .unwrap_or(line.len());
    let (word, rest) = line.split_at(split);
    let rest = rest.trim();

    let Some(&(_, kw)) = TABLE.iter().find(|(name, _)| *name == word) else {
        return Command::Invalid(line.to_string());
    };

    if !kw.takes_int() {
        if !rest.is_empty() {
            return Command::Invalid(line.to_string());
        }
        return match kw {
            Keyword::Open => Command::Open,
            Keyword::Close => Command::Close,
            Keyword::Stop => Command::Stop,
            Keyword::Home => Command::Home,
            Keyword::OpenUntilBreak => Command::OpenUntilBreak,
            Keyword::MoveToPosition | Keyword::MoveToForce => Command::Invalid(line.to_string()),
        };
    }

    let Ok(n) = rest.parse::<i32>() else {
        return Command::Invalid(line.to_string());
    };
    match kw {
        Keyword::MoveToPosition => Command::MoveToPosition(n),
        Keyword::MoveToForce => Command::MoveToForce(n),
        _ => Command::Invalid(line.to_string()),
    }
}

impl Command {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Command::Invalid(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Open => f.write_str("open"),
            Command::Close => f.write_str("close"),
            Command::Stop => f.write_str("stop"),
            Command::MoveToPosition(n) => write!(f, "move_to_position{n}"),
            Command::MoveToForce(n) => write!(f, "move_to_force{n}"),
            Command::Home => f.write_str("home"),
            Command::OpenUntilBreak => f.write_str("open_until_break"),
            Command::Invalid(raw) => f.write_str(raw),
        }
    }
}

impl std::str::FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse(s))
    }
}
