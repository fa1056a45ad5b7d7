//! Output line classification
//!
//! All knowledge of package-manager wording lives here. Everything else
//! asks the [`OutputClassifier`] what a line means.

/// Meaning of a single output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Info,
    Success,
    Warning,
    /// A package conflict; carries the conflicting package when it can be parsed
    Conflict { hint: Option<String> },
    Fatal,
}

impl LineClass {
    #[must_use]
    pub fn log_kind(&self) -> lunaris_types::LogKind {
        use lunaris_types::LogKind;
        match self {
            Self::Info => LogKind::Info,
            Self::Success => LogKind::Success,
            Self::Warning | Self::Conflict { .. } => LogKind::Warning,
            Self::Fatal => LogKind::Error,
        }
    }
}

pub trait OutputClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineClass;

    /// Whether the line shows that privilege escalation wants a password
    /// or rejected the one it got.
    fn is_auth_prompt(&self, line: &str) -> bool;

    /// Whether the line deserves a place in the message log.
    fn is_worth_keeping(&self, line: &str) -> bool;
}

/// Substring vocabulary, matched against the lowercased line
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub conflict: Vec<&'static str>,
    /// Phrases that mention conflicts without being one
    pub benign: Vec<&'static str>,
    /// Yes/no prompt marker; a conflict when paired with a `replace_verbs` entry
    pub prompt: &'static str,
    pub replace_verbs: Vec<&'static str>,
    pub fatal: Vec<&'static str>,
    pub warning: Vec<&'static str>,
    pub success: Vec<&'static str>,
    pub auth: Vec<&'static str>,
    pub keep: Vec<&'static str>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            conflict: vec!["conflict", "exists in filesystem"],
            benign: vec![
                "checking for file conflicts",
                "checking for conflicts",
                "checking for inner conflicts",
                "looking for conflicting packages",
            ],
            prompt: "[y/n]",
            replace_verbs: vec!["replace", "remove"],
            fatal: vec!["error", "fatal", "failed"],
            warning: vec!["warning"],
            success: vec!["installed", "success"],
            auth: vec![
                "[sudo] password for",
                "password:",
                "a password is required",
                "sorry, try again",
                "incorrect password",
                "authentication failure",
                "a terminal is required",
            ],
            keep: vec!["error", "warning", "fatal", "installing", "building", "conflict"],
        }
    }
}

/// Vocabulary based classifier for pacman and the AUR helpers
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    vocabulary: Vocabulary,
}

impl DefaultClassifier {
    #[must_use]
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    fn contains_any(haystack: &str, needles: &[&str]) -> bool {
        needles.iter().any(|needle| haystack.contains(needle))
    }

    fn is_conflict(&self, lower: &str) -> bool {
        let v = &self.vocabulary;
        if Self::contains_any(lower, &v.benign) {
            return false;
        }
        Self::contains_any(lower, &v.conflict)
            || (lower.contains(v.prompt) && Self::contains_any(lower, &v.replace_verbs))
    }
}

impl OutputClassifier for DefaultClassifier {
    fn classify(&self, line: &str) -> LineClass {
        let lower = line.to_lowercase();
        let v = &self.vocabulary;

        if self.is_conflict(&lower) {
            LineClass::Conflict {
                hint: conflict_hint(line),
            }
        } else if Self::contains_any(&lower, &v.fatal) {
            LineClass::Fatal
        } else if Self::contains_any(&lower, &v.warning) {
            LineClass::Warning
        } else if Self::contains_any(&lower, &v.success) {
            LineClass::Success
        } else {
            LineClass::Info
        }
    }

    fn is_auth_prompt(&self, line: &str) -> bool {
        Self::contains_any(&line.to_lowercase(), &self.vocabulary.auth)
    }

    fn is_worth_keeping(&self, line: &str) -> bool {
        Self::contains_any(&line.to_lowercase(), &self.vocabulary.keep)
    }
}

/// Best-effort extraction of the package that would be replaced.
///
/// Understands `":: a and b are in conflict"`, `"Remove b? [y/N]"` and
/// `"a: /path exists in filesystem (owned by b)"`.
#[must_use]
pub fn conflict_hint(line: &str) -> Option<String> {
    let trimmed = line.trim().trim_start_matches("::").trim();
    // byte offsets in `lower` must stay valid in `trimmed`
    let lower = trimmed.to_ascii_lowercase();

    if let Some(start) = lower.find("(owned by ") {
        let rest = &trimmed[start + "(owned by ".len()..];
        return rest
            .split(')')
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from);
    }

    for verb in ["remove ", "replace "] {
        if let Some(start) = lower.rfind(verb) {
            let rest = &trimmed[start + verb.len()..];
            let name = rest
                .split(|c: char| c == '?' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            if !name.is_empty() {
                return Some(name.trim_end_matches(',').to_string());
            }
        }
    }

    if let Some(end) = lower.find(" are in conflict") {
        let pair = &trimmed[..end];
        if let Some((_, second)) = pair.split_once(" and ") {
            let name = second.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    None
}
