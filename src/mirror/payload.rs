use std::collections::HashSet;

use serenity::all::Embed;

/// Text command that triggers a backfill of the source channel.
pub const BACKFILL_COMMAND: &str = "!Update";

const FALLBACK_FILENAME: &str = "attachment";

/// Read-only view of a gateway message, detached from the gateway types.
#[derive(Debug, Clone, Default)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
    pub role_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

impl Attachment {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = filename_from_url(&url);
        Self { url, filename }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Outbound form of one relayed message. Empty collections are left out of
/// the send call.
#[derive(Debug, Clone, Default)]
pub struct MirrorPayload {
    pub content: Option<String>,
    pub files: Vec<FetchedFile>,
    pub embeds: Vec<Embed>,
}

impl MirrorPayload {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.files.is_empty() && self.embeds.is_empty()
    }
}

/// Last path segment of `url` with the query string and fragment removed.
pub fn filename_from_url(url: &str) -> String {
    let name = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };

    match name {
        Some(name) if !name.is_empty() => name,
        _ => FALLBACK_FILENAME.to_string(),
    }
}

/// Builds the outbound payload for `message`. `files` are the attachments
/// that were fetched successfully, already in source order.
pub fn build_payload(message: &ChatMessage, files: Vec<FetchedFile>) -> MirrorPayload {
    let content = if message.content.is_empty() {
        None
    } else {
        Some(format!("{}: {}", message.author_name, message.content))
    };

    MirrorPayload {
        content,
        files,
        embeds: message.embeds.clone(),
    }
}

pub fn is_backfill_command(content: &str) -> bool {
    content.trim() == BACKFILL_COMMAND
}

/// Bots are never authorized, and an empty role set authorizes nobody.
pub fn is_authorized(message: &ChatMessage, authorized_roles: &HashSet<u64>) -> bool {
    !message.author_is_bot
        && message
            .role_ids
            .iter()
            .any(|role_id| authorized_roles.contains(role_id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;
    use serenity::all::Embed;
    use test_case::test_case;

    use super::*;

    fn message(author: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: 1,
            channel_id: 10,
            author_name: author.to_string(),
            content: content.to_string(),
            ..ChatMessage::default()
        }
    }

    fn embed(title: &str) -> Embed {
        serde_json::from_value(json!({ "type": "rich", "title": title }))
            .expect("embed json should deserialize")
    }

    #[test_case("https://cdn.example/img.png?sig=abc", "img.png" ; "query string stripped")]
    #[test_case("https://cdn.example/a/b/report.pdf", "report.pdf" ; "nested path")]
    #[test_case("https://cdn.example/clip.mp4#t=10", "clip.mp4" ; "fragment stripped")]
    #[test_case("https://cdn.example/", "attachment" ; "empty segment")]
    #[test_case("not a url/notes.txt?x=1", "notes.txt" ; "unparseable url")]
    fn filename_from_url_cases(url: &str, expected: &str) {
        assert_eq!(filename_from_url(url), expected);
    }

    #[test]
    fn attachment_from_url_keeps_the_full_url() {
        let attachment = Attachment::from_url("https://cdn.example/img.png?sig=abc");
        assert_eq!(attachment.url, "https://cdn.example/img.png?sig=abc");
        assert_eq!(attachment.filename, "img.png");
    }

    #[test]
    fn text_message_is_prefixed_with_author() {
        let payload = build_payload(&message("alice", "hello"), Vec::new());

        assert_eq!(payload.content.as_deref(), Some("alice: hello"));
        assert!(payload.files.is_empty());
        assert!(payload.embeds.is_empty());
    }

    #[test]
    fn empty_text_has_no_content() {
        let file = FetchedFile {
            filename: "img.png".to_string(),
            data: b"png-bytes".to_vec(),
        };
        let payload = build_payload(&message("alice", ""), vec![file.clone()]);

        assert!(payload.content.is_none());
        assert_eq!(payload.files, vec![file]);
    }

    #[test]
    fn whitespace_text_is_still_relayed() {
        let payload = build_payload(&message("bob", "  "), Vec::new());
        assert_eq!(payload.content.as_deref(), Some("bob:   "));
    }

    #[test]
    fn embeds_are_carried_through_in_order() {
        let mut source = message("alice", "");
        source.embeds = vec![embed("first"), embed("second")];

        let payload = build_payload(&source, Vec::new());

        let titles: Vec<_> = payload
            .embeds
            .iter()
            .map(|embed| embed.title.clone().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn entirely_empty_message_yields_empty_payload() {
        let payload = build_payload(&message("alice", ""), Vec::new());
        assert!(payload.is_empty());
    }

    #[test_case("!Update", true ; "exact")]
    #[test_case("  !Update\n", true ; "surrounding whitespace")]
    #[test_case("!update", false ; "wrong case")]
    #[test_case("!Update now", false ; "arguments")]
    #[test_case("", false ; "empty")]
    fn backfill_command_detection(content: &str, expected: bool) {
        assert_eq!(is_backfill_command(content), expected);
    }

    #[test]
    fn caller_with_an_authorized_role_is_authorized() {
        let mut caller = message("mod", "!Update");
        caller.role_ids = vec![5, 42];
        let roles = HashSet::from([42]);

        assert!(is_authorized(&caller, &roles));
    }

    #[test]
    fn caller_without_matching_roles_is_not_authorized() {
        let mut caller = message("guest", "!Update");
        caller.role_ids = vec![5];

        assert!(!is_authorized(&caller, &HashSet::from([42])));
        assert!(!is_authorized(&caller, &HashSet::new()));
    }

    #[test]
    fn bot_is_never_authorized() {
        let mut caller = message("helper-bot", "!Update");
        caller.author_is_bot = true;
        caller.role_ids = vec![42];

        assert!(!is_authorized(&caller, &HashSet::from([42])));
    }
}
