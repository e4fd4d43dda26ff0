// ABOUTME: Minimal IRC line protocol used by Twitch chat
// ABOUTME: Parses inbound lines into typed values and formats outbound PASS/NICK/JOIN/PONG/PRIVMSG lines

/// A chat message addressed to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Raw prefix without the leading ':' (e.g. `alice!alice@alice.tmi.twitch.tv`)
    pub prefix: String,
    /// Channel without the leading '#'
    pub channel: String,
    pub body: String,
}

impl ChatMessage {
    /// Nick portion of the prefix, if the prefix has the `nick!user@host` shape
    pub fn sender(&self) -> Option<&str> {
        let (nick, rest) = self.prefix.split_once('!')?;
        if nick.is_empty() || !rest.contains('@') {
            return None;
        }
        Some(nick)
    }
}

/// One decoded inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    /// Keep-alive ping; carries the payload to echo back
    Ping { payload: String },
    ChatMessage(ChatMessage),
    /// `001` numeric: the server accepted our credentials
    Welcome,
    /// Server is about to drop the connection and wants a reconnect
    Reconnect,
    Notice { message: String },
    Unrecognized,
}

/// Parse a single line (without its CRLF terminator)
pub fn parse_line(line: &str) -> IrcLine {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    // IRCv3 tags, only present if the capability was requested
    if rest.starts_with('@') {
        match rest.split_once(' ') {
            Some((_, after)) => rest = after,
            None => return IrcLine::Unrecognized,
        }
    }

    let prefix = if let Some(stripped) = rest.strip_prefix(':') {
        match stripped.split_once(' ') {
            Some((prefix, after)) => {
                rest = after;
                Some(prefix)
            }
            None => return IrcLine::Unrecognized,
        }
    } else {
        None
    };

    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command {
        "PING" => IrcLine::Ping {
            payload: params.trim_start_matches(':').to_string(),
        },
        "001" => IrcLine::Welcome,
        "RECONNECT" => IrcLine::Reconnect,
        "NOTICE" => {
            let message = params
                .split_once(" :")
                .map(|(_, text)| text)
                .unwrap_or(params);
            IrcLine::Notice {
                message: message.to_string(),
            }
        }
        "PRIVMSG" => {
            let Some(prefix) = prefix else {
                return IrcLine::Unrecognized;
            };
            let Some((target, body)) = params.split_once(" :") else {
                return IrcLine::Unrecognized;
            };
            let Some(channel) = target.trim().strip_prefix('#') else {
                return IrcLine::Unrecognized;
            };
            IrcLine::ChatMessage(ChatMessage {
                prefix: prefix.to_string(),
                channel: channel.to_string(),
                body: body.to_string(),
            })
        }
        _ => IrcLine::Unrecognized,
    }
}

/// Collapse line breaks so user-supplied text can never start a new protocol line
fn sanitize(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn pass(credential: &str) -> String {
    format!("PASS {}\r\n", sanitize(credential))
}

pub fn nick(identity: &str) -> String {
    format!("NICK {}\r\n", sanitize(identity))
}

pub fn join(channel: &str) -> String {
    format!("JOIN #{}\r\n", sanitize(channel))
}

pub fn pong(host: &str) -> String {
    format!("PONG :{}\r\n", sanitize(host))
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{} :{}\r\n", sanitize(channel), sanitize(text))
}
