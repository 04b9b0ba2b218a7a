use std::fmt;

/// Named events the parent reacts to. Tokens must stay disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentEvent {
    ModNotFound,
    ModCorrupt,
    IsaacNotFound,
    IsaacChecksComplete,
    StartIsaac,
    Connected,
    Disconnected,
}

impl ParentEvent {
    pub fn token(self) -> &'static str {
        match self {
            ParentEvent::ModNotFound => "modNotFound",
            ParentEvent::ModCorrupt => "modCorrupt",
            ParentEvent::IsaacNotFound => "isaacNotFound",
            ParentEvent::IsaacChecksComplete => "isaacChecksComplete",
            ParentEvent::StartIsaac => "startIsaac",
            ParentEvent::Connected => "connected",
            ParentEvent::Disconnected => "disconnected",
        }
    }
}

/// One line sent from a child process to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Bare event token.
    Event(ParentEvent),
    /// Free-form progress text from the startup checks.
    Progress(String),
    /// `info <text>` from the relay.
    Info(String),
    /// A line received from a mod client, forwarded as-is.
    Forward(String),
    /// `error: <text>` from the startup checks.
    Fatal(String),
    /// `error <text>` from the relay.
    RelayFatal(String),
}

impl Message {
    pub fn progress(text: impl Into<String>) -> Self {
        Message::Progress(text.into())
    }

    pub fn info(text: impl Into<String>) -> Self {
        Message::Info(text.into())
    }

    pub fn is_event(&self, event: ParentEvent) -> bool {
        matches!(self, Message::Event(e) if *e == event)
    }
}

impl From<ParentEvent> for Message {
    fn from(event: ParentEvent) -> Self {
        Message::Event(event)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = match self {
            Message::Event(event) => event.token().to_string(),
            Message::Progress(text) | Message::Forward(text) => text.clone(),
            Message::Info(text) => format!("info {text}"),
            Message::Fatal(text) => format!("error: {text}"),
            Message::RelayFatal(text) => format!("error {text}"),
        };
        // The protocol is one message per line.
        write!(f, "{}", line.replace(['\r', '\n'], " "))
    }
}

/// A line received from the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentCommand {
    Exit,
    Line(String),
}

impl ParentCommand {
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line == "exit" {
            ParentCommand::Exit
        } else {
            ParentCommand::Line(line.to_string())
        }
    }
}
