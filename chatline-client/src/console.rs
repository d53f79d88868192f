//! Interactive Console
//!
//! Reads commands from stdin and prints session changes as text.
//!
//! ## Commands
//!
//! - `/open EMAIL`: open (or create) the conversation with EMAIL
//! - `/new EMAIL`: start a chat that is created on the first message
//! - `/close`: leave the open conversation
//! - `/list`: refresh and print the conversation list
//! - `/quit`: exit
//!
//! Any other line is sent as a message to the open conversation.

use anyhow::Result;
use chatline_session::{ChatSession, Message, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open(String),
    New(String),
    Close,
    List,
    Quit,
    Send(String),
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }
        if !line.starts_with('/') {
            return ConsoleCommand::Send(line.to_string());
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "/open" => ConsoleCommand::Open(argument.to_string()),
            "/new" => ConsoleCommand::New(argument.to_string()),
            "/close" | "/back" => ConsoleCommand::Close,
            "/list" => ConsoleCommand::List,
            "/quit" | "/exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}

/// Tracks what has been printed so only changes are rendered
#[derive(Debug, Default)]
pub struct ConsoleView {
    user_id: String,
    conversation_key: Option<String>,
    printed_messages: usize,
    typing: bool,
    notice: Option<String>,
}

impl ConsoleView {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Lines describing what changed since the last snapshot
    pub fn update(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if snapshot.notice != self.notice {
            if let Some(notice) = &snapshot.notice {
                lines.push(format!("! {}", notice));
            }
            self.notice = snapshot.notice.clone();
        }

        let key = snapshot.active.as_ref().map(|active| {
            format!(
                "{}:{}",
                active.counterpart().email,
                active.conversation_id().unwrap_or("pending")
            )
        });
        let switched = key != self.conversation_key;
        let pending_became_established = switched
            && snapshot.active.as_ref().is_some_and(|a| !a.is_pending())
            && self
                .conversation_key
                .as_deref()
                .zip(snapshot.active_email())
                .is_some_and(|(previous, email)| previous == format!("{}:pending", email));

        if switched {
            if !pending_became_established {
                self.printed_messages = 0;
                match &snapshot.active {
                    Some(active) if active.is_pending() => lines.push(format!(
                        "-- new chat with {} (created on first message)",
                        active.counterpart().email
                    )),
                    Some(active) => {
                        lines.push(format!("-- conversation with {}", active.counterpart().email))
                    }
                    None => lines.push("-- no conversation open".to_string()),
                }
            }
            self.conversation_key = key;
            self.typing = false;
        }

        if let Some(active) = &snapshot.active {
            let messages = active.messages();
            for message in messages.iter().skip(self.printed_messages) {
                lines.push(self.format_message(message, &active.counterpart().email));
            }
            self.printed_messages = messages.len();
        }

        if snapshot.counterpart_typing != self.typing {
            self.typing = snapshot.counterpart_typing;
            if let (true, Some(email)) = (self.typing, snapshot.active_email()) {
                lines.push(format!("   {} is typing...", email));
            }
        }

        lines
    }

    fn format_message(&self, message: &Message, counterpart_email: &str) -> String {
        let author = if message.sender == self.user_id {
            "you"
        } else {
            counterpart_email
        };
        format!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M"),
            author,
            message.content
        )
    }
}

/// Conversation list as printable lines
pub fn render_list(snapshot: &SessionSnapshot) -> Vec<String> {
    if snapshot.conversations.is_empty() {
        return vec!["No conversations yet".to_string()];
    }

    snapshot
        .conversations
        .iter()
        .map(|summary| {
            let marker = if snapshot.active_email() == Some(summary.counterpart_email.as_str()) {
                ">"
            } else if summary.unread {
                "*"
            } else {
                " "
            };
            let when = summary
                .last_activity
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            format!(
                "{} {:<30} {:<16} {}",
                marker,
                summary.counterpart_email,
                when,
                summary.preview()
            )
        })
        .collect()
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Run the console until `/quit`, end of input or Ctrl-C
pub async fn run(session: &ChatSession) -> Result<()> {
    let mut view = ConsoleView::new(session.user().user_id.clone());
    let mut snapshots = session.subscribe();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Signed in as {}. Type /open EMAIL to start.", session.user().email);
    print_lines(&view.update(&snapshots.borrow_and_update()));

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let lines = view.update(&snapshots.borrow_and_update());
                print_lines(&lines);
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    debug!("End of input");
                    break;
                };
                if !handle_line(session, &line).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Execute one console line, returning `false` to quit
async fn handle_line(session: &ChatSession, line: &str) -> bool {
    // Session errors are already surfaced as notices
    match ConsoleCommand::parse(line) {
        ConsoleCommand::Open(email) => {
            let _ = session.select_conversation(&email).await;
        }
        ConsoleCommand::New(email) => {
            let _ = session.start_new_chat(&email).await;
        }
        ConsoleCommand::Close => session.close_conversation().await,
        ConsoleCommand::List => {
            if let Err(e) = session.refresh_conversations().await {
                warn!("Failed to refresh conversations: {}", e);
                println!("! {}", e.user_message());
            }
            print_lines(&render_list(&session.snapshot()));
        }
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Send(content) => {
            let _ = session.send_message(&content).await;
        }
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(command) => {
            println!("! Unknown command {} (try /open, /new, /close, /list, /quit)", command)
        }
    }
    true
}
