//! Text message classification.

const LOOKUP_PREFIX: &str = "pesquisar ";

/// Where a text message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/start`, `/ajuda` or `/reset`, in any case, with or without `@botname`.
    Command(Command),
    /// `/something` the bot does not know.
    UnknownCommand(&'a str),
    /// `pesquisar <term>`; the term keeps its original case.
    Lookup(&'a str),
    /// `pesquisar` followed only by whitespace.
    EmptyLookup,
    /// Anything else.
    Question(&'a str),
}

/// Supported commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Reset,
}

impl Command {
    /// Parse the first word of a `/command` message.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "ajuda" => Some(Self::Help),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Classify a text message.
pub fn classify(text: &str) -> Route<'_> {
    let trimmed = text.trim_start();

    if trimmed.starts_with('/') {
        return match Command::parse(trimmed) {
            Some(command) => Route::Command(command),
            None => Route::UnknownCommand(trimmed),
        };
    }

    let has_prefix = trimmed
        .get(..LOOKUP_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(LOOKUP_PREFIX));

    if has_prefix {
        let term = trimmed[LOOKUP_PREFIX.len()..].trim();
        return if term.is_empty() {
            Route::EmptyLookup
        } else {
            Route::Lookup(term)
        };
    }

    Route::Question(text)
}
