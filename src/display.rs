// Plain-text rendering of chat snapshots for the terminal

use chrono::{DateTime, Local, Utc};
use textwrap::wrap;

use tenant_chat::messaging::{DirectoryView, Notice, NoticeLevel, ThreadState, ThreadView};
use tenant_chat::models::{Message, MessageStatus};

pub const NO_MESSAGES_YET: &str = "No messages yet. Say hello!";
const NO_CONVERSATIONS: &str = "You haven't started any conversations yet";

/// e.g. "May 01 - 10:15" in local time
pub fn format_timestamp(created_at: &DateTime<Utc>) -> String {
    created_at.with_timezone(&Local).format("%B %d - %H:%M").to_string()
}

fn status_marker(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Read => "[read]",
        MessageStatus::Delivered => "[delivered]",
        MessageStatus::Sent => "[sent]",
    }
}

pub fn render_directory(view: &DirectoryView) -> String {
    let mut lines = Vec::new();
    if view.loading && view.contacts.is_empty() {
        lines.push("Loading conversations...".to_string());
    } else if view.contacts.is_empty() && view.error.is_none() {
        lines.push(NO_CONVERSATIONS.to_string());
    }

    for contact in &view.contacts {
        match contact.unread_badge() {
            Some(count) => lines.push(format!("  {} ({})  [{}]", contact.name, count, contact.public_id)),
            None => lines.push(format!("  {}  [{}]", contact.name, contact.public_id)),
        }
    }

    if let Some(error) = &view.error {
        lines.push(format!("! {} (use /refresh to retry)", error));
    }
    lines.join("\n")
}

fn render_message(message: &Message, me: &str, width: usize) -> Vec<String> {
    let outbound = message.is_from(me);
    let author = if outbound {
        "You".to_string()
    } else {
        message
            .user_from
            .name
            .clone()
            .unwrap_or_else(|| message.user_from.public_id.clone())
    };

    let mut lines = vec![format!(
        "{} - {} {}",
        author,
        format_timestamp(&message.created_at),
        status_marker(message.status)
    )];
    let indent = if outbound { "    " } else { "  " };
    for line in wrap(&message.message, width.saturating_sub(indent.len()).max(10)) {
        lines.push(format!("{}{}", indent, line));
    }
    lines
}

pub fn render_thread(view: &ThreadView, me: &str, width: usize) -> String {
    let header = match &view.header {
        Some(header) => header,
        None => return "Select a conversation to start chatting".to_string(),
    };

    let mut lines = vec![format!("== {} ==", header.contact_name)];
    match &view.state {
        ThreadState::Loading if view.messages.is_empty() => lines.push("Loading messages...".to_string()),
        ThreadState::Empty => lines.push(NO_MESSAGES_YET.to_string()),
        ThreadState::Failed(reason) => {
            lines.push(format!("! Could not load messages: {}", reason));
            lines.push(format!("  /open {} to retry", header.contact_id));
        }
        _ => {}
    }
    // Server order, newest last
    for message in &view.messages {
        lines.extend(render_message(message, me, width));
    }
    lines.join("\n")
}

pub fn render_notice(notice: &Notice) -> String {
    let prefix = match notice.level {
        NoticeLevel::Info => "i",
        NoticeLevel::Success => "+",
        NoticeLevel::Error => "!",
    };
    format!("{} {}", prefix, notice.text)
}
