//! Kakao AlimTalk message templates.
//!
//! A template has a `title`, a `text` body, and an optional `button_name`.
//! Values that the sender fills in at send time are written as `#{name}`
//! placeholders and must stay unresolved in generated templates.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// A structured message template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub button_name: Option<String>,
}

/// One of the three template fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Text,
    ButtonName,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Title, Field::Text, Field::ButtonName];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Text => "text",
            Self::ButtonName => "button_name",
        }
    }
}

impl Template {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            button_name: None,
        }
    }

    pub fn with_button(mut self, button_name: impl Into<String>) -> Self {
        self.button_name = Some(button_name.into());
        self
    }

    /// Field content, with a missing button treated as empty.
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Text => &self.text,
            Field::ButtonName => self.button_name.as_deref().unwrap_or(""),
        }
    }

    /// True when every field is blank (a request to populate from scratch).
    pub fn is_blank(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).trim().is_empty())
    }

    /// Compact JSON form, used as classifier input and retrieval query.
    pub fn to_compact_json(&self) -> String {
        // Serializing a struct of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Placeholder names in order of first appearance across all fields.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for field in Field::ALL {
            for name in scan_placeholders(self.get(field)).into_iter().flatten() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Reject an unterminated `#{` or an empty `#{}` in any field.
    pub fn check_placeholders(&self) -> Result<(), InputError> {
        for field in Field::ALL {
            for found in scan_placeholders(self.get(field)) {
                match found {
                    Ok(name) if name.trim().is_empty() => {
                        return Err(InputError::Placeholder {
                            field: field.as_str(),
                            detail: "empty placeholder name `#{}`".into(),
                        });
                    }
                    Ok(_) => {}
                    Err(offset) => {
                        return Err(InputError::Placeholder {
                            field: field.as_str(),
                            detail: format!("unterminated `#{{` at byte {offset}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Carry over original content the draft must not change or blank.
    ///
    /// A field with content in `original` is restored when the request does
    /// not address it. `title` and `text` are also restored when the draft
    /// left them empty even though the request addressed them. A button is
    /// only removed when the request names it explicitly.
    pub fn preserve_from(mut self, original: &Template, scope: FieldScope) -> Template {
        if has_content(&original.title)
            && (!scope.addresses(Field::Title) || !has_content(&self.title))
        {
            self.title.clone_from(&original.title);
        }
        if has_content(&original.text)
            && (!scope.addresses(Field::Text) || !has_content(&self.text))
        {
            self.text.clone_from(&original.text);
        }
        if has_content(original.get(Field::ButtonName))
            && (!scope.addresses(Field::ButtonName)
                || (!scope.explicit && !has_content(self.get(Field::ButtonName))))
        {
            self.button_name.clone_from(&original.button_name);
        }
        self
    }
}

fn has_content(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Scan `#{name}` occurrences. `Err(offset)` marks an unterminated opener.
fn scan_placeholders(s: &str) -> Vec<Result<&str, usize>> {
    let mut found = Vec::new();
    let mut rest = 0;
    while let Some(pos) = s[rest..].find("#{") {
        let start = rest + pos + 2;
        match s[start..].find('}') {
            Some(end) => {
                found.push(Ok(&s[start..start + end]));
                rest = start + end + 1;
            }
            None => {
                found.push(Err(rest + pos));
                break;
            }
        }
    }
    found
}

// ── Field scope ──

const TITLE_WORDS: &[&str] = &["title"];
const TEXT_WORDS: &[&str] = &["text", "body", "content"];
const BUTTON_WORDS: &[&str] = &["button"];

const TITLE_KO: &[&str] = &["제목", "타이틀"];
const TEXT_KO: &[&str] = &["본문", "내용", "문구"];
const BUTTON_KO: &[&str] = &["버튼"];

/// Which template fields an edit request talks about.
///
/// Detection is keyword-based. English keywords match whole words (with an
/// optional plural `s`); Korean keywords match as substrings because
/// particles attach directly to nouns. A request naming no field addresses
/// every field, but only implicitly: see [`Template::preserve_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldScope {
    title: bool,
    text: bool,
    button_name: bool,
    explicit: bool,
}

impl FieldScope {
    /// Every field, inferred from a request that names none.
    pub const ALL: FieldScope = FieldScope {
        title: true,
        text: true,
        button_name: true,
        explicit: false,
    };

    pub fn from_request(user_input: &str) -> Self {
        let lower = user_input.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mentions = |english: &[&str], korean: &[&str]| {
            words.iter().any(|w| {
                english
                    .iter()
                    .any(|k| *w == *k || w.strip_suffix('s') == Some(*k))
            }) || korean.iter().any(|k| lower.contains(k))
        };

        let scope = FieldScope {
            title: mentions(TITLE_WORDS, TITLE_KO),
            text: mentions(TEXT_WORDS, TEXT_KO),
            button_name: mentions(BUTTON_WORDS, BUTTON_KO),
            explicit: true,
        };

        if scope.is_empty() { Self::ALL } else { scope }
    }

    /// True when the request named at least one field.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn addresses(&self, field: Field) -> bool {
        match field {
            Field::Title => self.title,
            Field::Text => self.text,
            Field::ButtonName => self.button_name,
        }
    }

    fn is_empty(&self) -> bool {
        !(self.title || self.text || self.button_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_missing_button_as_none() {
        let t: Template = serde_json::from_str(r#"{"title":"T","text":"X"}"#).unwrap();
        assert_eq!(t, Template::new("T", "X"));
    }

    #[test]
    fn placeholders_in_order_without_duplicates() {
        let t = Template::new("#{회사명} 안내", "안녕하세요 #{수신자명}님, #{회사명}입니다.")
            .with_button("#{링크}");
        assert_eq!(t.placeholders(), vec!["회사명", "수신자명", "링크"]);
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        let t = Template::new("Notice", "Hello #{name");
        let err = t.check_placeholders().unwrap_err();
        assert!(err.to_string().contains("text"), "{err}");
    }

    #[test]
    fn empty_placeholder_is_rejected() {
        let t = Template::new("#{} notice", "Hello");
        assert!(matches!(
            t.check_placeholders(),
            Err(InputError::Placeholder { field: "title", .. })
        ));
    }

    #[test]
    fn well_formed_placeholders_pass() {
        let t = Template::new("Order #{order_id}", "Hi #{name}, shipped on #{date}.");
        assert!(t.check_placeholders().is_ok());
    }

    #[test]
    fn scope_detects_title_only() {
        let scope = FieldScope::from_request("change the title to C");
        assert!(scope.addresses(Field::Title));
        assert!(!scope.addresses(Field::Text));
        assert!(!scope.addresses(Field::ButtonName));
    }

    #[test]
    fn scope_ignores_words_containing_keywords() {
        // "context" contains "text" but is not about the body.
        let scope = FieldScope::from_request("keep the context but rename the buttons");
        assert!(!scope.addresses(Field::Text));
        assert!(scope.addresses(Field::ButtonName));
    }

    #[test]
    fn scope_detects_korean_with_particles() {
        let scope = FieldScope::from_request("제목을 '주문 완료'로 바꿔줘");
        assert!(scope.addresses(Field::Title));
        assert!(!scope.addresses(Field::Text));
    }

    #[test]
    fn scope_without_field_mentions_addresses_all() {
        assert_eq!(FieldScope::from_request("make it more polite"), FieldScope::ALL);
    }

    #[test]
    fn preserve_restores_unaddressed_fields() {
        let original = Template::new("A", "B");
        let draft = Template::new("C", "");
        let merged = draft.preserve_from(&original, FieldScope::from_request("change the title to C"));
        assert_eq!(merged, Template::new("C", "B"));
    }

    #[test]
    fn preserve_never_blanks_addressed_text() {
        let original = Template::new("A", "B");
        let draft = Template::new("A2", "  ");
        let merged = draft.preserve_from(&original, FieldScope::ALL);
        assert_eq!(merged, Template::new("A2", "B"));
    }

    #[test]
    fn preserve_allows_removing_an_addressed_button() {
        let original = Template::new("A", "B").with_button("Open");
        let draft = Template::new("A", "B");
        let merged = draft.preserve_from(&original, FieldScope::from_request("remove the button"));
        assert_eq!(merged.button_name, None);
    }

    #[test]
    fn preserve_keeps_button_when_request_names_no_field() {
        let original = Template::new("A", "B").with_button("Open");
        let draft = Template::new("A2", "B2");
        let merged = draft.preserve_from(&original, FieldScope::from_request("make it more polite"));
        assert_eq!(merged, Template::new("A2", "B2").with_button("Open"));
    }

    #[test]
    fn preserve_takes_reworded_button_when_request_names_no_field() {
        let original = Template::new("A", "B").with_button("Open");
        let draft = Template::new("A", "B").with_button("Open now");
        let merged = draft.preserve_from(&original, FieldScope::from_request("make it more polite"));
        assert_eq!(merged.button_name.as_deref(), Some("Open now"));
    }

    #[test]
    fn scope_message_is_not_a_field_keyword() {
        let scope = FieldScope::from_request("write a welcome message");
        assert!(!scope.is_explicit());
        assert!(scope.addresses(Field::Title));
        assert!(scope.addresses(Field::ButtonName));
    }

    #[test]
    fn preserve_keeps_unaddressed_button() {
        let original = Template::new("A", "B").with_button("Open");
        let draft = Template::new("A", "New body");
        let merged = draft.preserve_from(&original, FieldScope::from_request("rewrite the body"));
        assert_eq!(merged.button_name.as_deref(), Some("Open"));
        assert_eq!(merged.text, "New body");
    }

    #[test]
    fn preserve_populates_blank_original_fields() {
        let original = Template::default();
        let draft = Template::new("Welcome", "Hi #{name}").with_button("Start");
        let merged = draft
            .clone()
            .preserve_from(&original, FieldScope::from_request("signup welcome"));
        assert_eq!(merged, draft);
    }
}
