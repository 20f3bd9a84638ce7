//! Build the nostr note announcing a business submission.

use crate::{Error, Result};
use entity::{publish_log::Trigger, submission};
use nostr_sdk::{Event, EventBuilder, Keys, Kind, Tag, TagKind};

/// short text note
pub const KIND: u64 = 1;

/// Max chars of the note content
pub const MAX_CONTENT_CHARS: usize = 500;

/// Unsigned event built from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: u64,
    pub tags: Vec<[String; 2]>,
    pub content: String,
}

impl EventDraft {
    /// Values of all tags named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t[0] == name)
            .map(|t| t[1].as_str())
    }

    pub fn to_event(&self, keys: &Keys) -> Result<Event> {
        let tags = self
            .tags
            .iter()
            .map(|[name, value]| {
                Tag::Generic(TagKind::Custom(name.clone()), vec![value.clone()])
            })
            .collect::<Vec<_>>();
        EventBuilder::new(Kind::from(self.kind), self.content.clone(), &tags)
            .to_event(keys)
            .map_err(|e| Error::Nostr(e.to_string()))
    }
}

fn tag(name: &str, value: impl Into<String>) -> [String; 2] {
    [name.to_owned(), value.into()]
}

fn render_coordinate(c: Option<f64>) -> String {
    c.map(|c| c.to_string()).unwrap_or_default()
}

/// Build the note for a submission, never fails.
///
/// Missing city or coordinates are rendered as empty strings, the `geo` tag
/// is always present.
pub fn build_event(submission: &submission::Model, trigger: Trigger) -> EventDraft {
    let mut tags = vec![
        tag("submissionId", submission.id.to_string()),
        tag("trigger", trigger.as_str()),
        tag("city", submission.city.clone().unwrap_or_default()),
        tag(
            "geo",
            format!(
                "{},{}",
                render_coordinate(submission.latitude),
                render_coordinate(submission.longitude)
            ),
        ),
    ];
    if let Some(category) = submission.category.as_deref() {
        let category = sanitize(category);
        if !category.is_empty() {
            tags.push(tag("category", category));
        }
    }
    tags.push(tag("t", "bitcoin"));

    EventDraft {
        kind: KIND,
        tags,
        content: build_content(&submission.name, submission.notes.as_deref()),
    }
}

fn build_content(name: &str, notes: Option<&str>) -> String {
    let name = sanitize(name);
    let notes = notes.map(sanitize).unwrap_or_default();
    let content = if notes.is_empty() {
        name
    } else if name.is_empty() {
        notes
    } else {
        format!("{}\n\n{}", name, notes)
    };
    truncate_chars(&content, MAX_CONTENT_CHARS)
}

/// Keep the first `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

/// Elements whose body is dropped together with the tags.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

fn element_name(tag: &str) -> String {
    tag.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Remove markup from user text.
///
/// Tags and comments are dropped, `<script>` and `<style>` lose their body,
/// any angle bracket left over is removed as well.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = match after.find('>') {
            Some(end) => end,
            None => {
                // unterminated tag, drop the bracket
                rest = after;
                continue;
            }
        };
        let name = element_name(&after[..end]);
        rest = &after[end + 1..];
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            // to_ascii_lowercase keeps byte offsets
            let close = format!("</{}", name);
            rest = match rest.to_ascii_lowercase().find(&close) {
                Some(pos) => {
                    let tail = &rest[pos..];
                    match tail.find('>') {
                        Some(gt) => &tail[gt + 1..],
                        None => "",
                    }
                }
                None => "",
            };
        }
    }
    out.push_str(rest);
    out.retain(|c| c != '<' && c != '>');
    out
}

/// Strip markup and collapse the whitespace of each line.
pub fn sanitize(input: &str) -> String {
    let text = strip_markup(input);
    let lines = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>();
    let mut out = lines.join("\n");
    // at most one blank line in a row
    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    out.trim().to_owned()
}
