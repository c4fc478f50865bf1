//! Decoding of operator input at the channel boundary.
//!
//! Button callbacks carry `verb:address` tokens; typed commands are
//! `/verb <address>`. Both decode into the same [`Action`] so the router never
//! handles raw strings.

/// Upper bound on a callback token, in bytes (Bot API `callback_data` limit).
pub const MAX_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Transfer(String),
    Balance(String),
}

impl Action {
    /// Callback token carried by a button, e.g. `transfer:T9yD...`.
    pub fn encode(&self) -> String {
        match self {
            Action::Transfer(address) => format!("transfer:{}", address),
            Action::Balance(address) => format!("balance:{}", address),
        }
    }

    /// Whether the encoded token can be attached to a button.
    pub fn fits_button(&self) -> bool {
        self.encode().len() <= MAX_TOKEN_LEN
    }

    pub fn decode(token: &str) -> Option<Self> {
        let (verb, address) = token.split_once(':')?;
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        match verb {
            "transfer" => Some(Action::Transfer(address.to_string())),
            "balance" => Some(Action::Balance(address.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    List,
    Run(Action),
    /// A known command missing its address argument.
    Usage(&'static str),
}

impl Command {
    /// Parse a chat message. Returns `None` for anything that is not a known command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        // "/transfer@SomeBot" in group chats
        let name = head.strip_prefix('/')?.split('@').next().unwrap_or_default();

        match name {
            "start" | "help" => Some(Command::Start),
            "list" => Some(Command::List),
            "transfer" if rest.is_empty() => Some(Command::Usage("/transfer <address>")),
            "transfer" => Some(Command::Run(Action::Transfer(rest.to_string()))),
            "balance" if rest.is_empty() => Some(Command::Usage("/balance <address>")),
            "balance" => Some(Command::Run(Action::Balance(rest.to_string()))),
            _ => None,
        }
    }
}
