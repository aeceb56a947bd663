use seethru_core::MessageType;

/// Client: `LISTEN → REQUEST → PLAY → END → LISTEN`, with `REQUEST → LISTEN`
/// on rejection or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Listen,
    Request,
    Play,
    End,
}

/// Server: `NOTIFY → REPLY → STREAM → END → NOTIFY`, with `REPLY → NOTIFY`
/// on an invalid client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Notify,
    Reply,
    Stream,
    End,
}

/// State published by a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    Client(ClientState),
    Server(ServerState),
}

impl ProtocolState {
    /// Whether a message of `kind` is worth queueing in this state.
    ///
    /// | State          | Queued                |
    /// |----------------|-----------------------|
    /// | client LISTEN  | HELLO                 |
    /// | client REQUEST | READY, REJECT         |
    /// | client PLAY    | DATA                  |
    /// | server NOTIFY  | REQUEST               |
    /// | server STREAM  | DATA_ACK, END         |
    ///
    /// Nothing is queued in the transient REPLY and END states.
    pub fn accepts(&self, kind: MessageType) -> bool {
        use MessageType::*;
        matches!(
            (self, kind),
            (Self::Client(ClientState::Listen), Hello)
                | (Self::Client(ClientState::Request), Ready | Reject)
                | (Self::Client(ClientState::Play), Data)
                | (Self::Server(ServerState::Notify), Request)
                | (Self::Server(ServerState::Stream), DataAck | End)
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Listen => "LISTEN",
            Self::Request => "REQUEST",
            Self::Play => "PLAY",
            Self::End => "END",
        })
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Notify => "NOTIFY",
            Self::Reply => "REPLY",
            Self::Stream => "STREAM",
            Self::End => "END",
        })
    }
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(s) => write!(f, "client/{s}"),
            Self::Server(s) => write!(f, "server/{s}"),
        }
    }
}
