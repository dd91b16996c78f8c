use bytes::{BufMut, BytesMut};
use std::path::PathBuf;

use crate::{item::ContentItem, viewer::Progress};

const TERMINATOR: &[u8] = b"\n";
const PREVIEW_CHARS: usize = 40;

#[derive(Debug, PartialEq)]
pub enum Command {
    Add(String),
    Upload(PathBuf),
    List,
    View(usize),
    Next,
    Prev,
    Close,
    Evict,
    Save,
    Quit,
}

impl Command {
    pub fn deserialize(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(anyhow::format_err!("empty command"));
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "ADD" => {
                if rest.is_empty() {
                    return Err(anyhow::format_err!("malformed ADD command"));
                }
                Ok(Command::Add(rest.to_string()))
            }
            "UPLOAD" => {
                if rest.is_empty() {
                    return Err(anyhow::format_err!("malformed UPLOAD command"));
                }
                Ok(Command::Upload(PathBuf::from(rest)))
            }
            "VIEW" => {
                if rest.is_empty() {
                    return Ok(Command::View(0));
                }
                // Positions are 1-based for the user
                match rest.parse::<usize>() {
                    Ok(position) if position > 0 => Ok(Command::View(position - 1)),
                    _ => Err(anyhow::format_err!("malformed VIEW command")),
                }
            }
            verb => {
                if !rest.is_empty() {
                    return Err(anyhow::format_err!("malformed {} command", verb));
                }
                match verb {
                    "LIST" => Ok(Command::List),
                    "NEXT" => Ok(Command::Next),
                    "PREV" => Ok(Command::Prev),
                    "CLOSE" => Ok(Command::Close),
                    "EVICT" => Ok(Command::Evict),
                    "SAVE" => Ok(Command::Save),
                    "QUIT" | "EXIT" => Ok(Command::Quit),
                    command => Err(anyhow::format_err!("unknown command {:?}", command)),
                }
            }
        }
    }
}

/// The story currently on screen, detached from the viewer.
#[derive(Debug, PartialEq)]
pub struct Showing {
    pub position: usize,
    pub total: usize,
    pub id: String,
    pub payload: String,
    pub progress: Vec<Progress>,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Ok,
    Added(ContentItem),
    Items(Vec<ContentItem>),
    Showing(Showing),
    Closed,
    Evicted(usize),
    Error(String),
    Bye,
}

impl Reply {
    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            Reply::Ok => buf.put(&b"+OK"[..]),
            Reply::Added(item) => {
                buf.put(format!("+ADDED {} expires={}", item.id, item.expires_at).as_bytes());
            }
            Reply::Items(items) => {
                buf.put(format!("*{}", items.len()).as_bytes());
                for (i, item) in items.iter().enumerate() {
                    buf.put(TERMINATOR);
                    buf.put(
                        format!(
                            "{} {} expires={} {}",
                            i + 1,
                            item.id,
                            item.expires_at,
                            preview(&item.payload)
                        )
                        .as_bytes(),
                    );
                }
            }
            Reply::Showing(showing) => {
                let bar = showing
                    .progress
                    .iter()
                    .map(|p| match p {
                        Progress::Done => '#',
                        Progress::Active => '>',
                        Progress::Pending => '.',
                    })
                    .collect::<String>();
                buf.put(
                    format!(
                        "={}/{} [{}] {}{}{} {}",
                        showing.position,
                        showing.total,
                        bar,
                        if showing.has_previous { "<" } else { "" },
                        showing.id,
                        if showing.has_next { ">" } else { "" },
                        preview(&showing.payload)
                    )
                    .as_bytes(),
                );
            }
            Reply::Closed => buf.put(&b"+CLOSED"[..]),
            Reply::Evicted(n) => buf.put(format!(":{n}").as_bytes()),
            Reply::Error(message) => buf.put(format!("-ERR {message}").as_bytes()),
            Reply::Bye => buf.put(&b"+BYE"[..]),
        }
        buf.put(TERMINATOR);
    }
}

fn preview(payload: &str) -> String {
    let mut chars = payload.chars();
    let head = chars.by_ref().take(PREVIEW_CHARS).collect::<String>();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
