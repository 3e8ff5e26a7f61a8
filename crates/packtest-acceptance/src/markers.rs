//! Participation markers: which buildpacks took part in a build.
//!
//! The marker format belongs to the build engine, so it is pluggable. The
//! default [`DetectGroupParser`] reads the group listed by the lifecycle's
//! detect phase:
//!
//! ```text
//! ===> DETECTING
//! [detector] 3 of 5 buildpacks participating
//! [detector] google.nodejs.runtime 1.0.0
//! [detector] google.nodejs.yarn    1.0.0
//! ===> ANALYZING
//! ```

use std::borrow::Cow;
use std::collections::BTreeSet;

const DETECT_HEADER: &str = "===> DETECTING";
const PHASE_PREFIX: &str = "===>";

/// Extracts the set of participating buildpack identifiers from a build log.
pub trait ParticipationParser: Send + Sync {
    /// Returns every buildpack identifier the log marks as participating.
    fn participants(&self, log: &str) -> BTreeSet<String>;
}

impl<F> ParticipationParser for F
where
    F: Fn(&str) -> BTreeSet<String> + Send + Sync,
{
    fn participants(&self, log: &str) -> BTreeSet<String> {
        self(log)
    }
}

/// Reads the participating group from the `===> DETECTING` section.
///
/// Lines may carry a `[detector]` style prefix and ANSI colour codes. Only
/// lines shaped like `<id> [<version>]` count; counters and diagnostics in
/// the section are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectGroupParser;

impl ParticipationParser for DetectGroupParser {
    fn participants(&self, log: &str) -> BTreeSet<String> {
        let mut participants = BTreeSet::new();
        let mut in_detect = false;
        for raw in log.lines() {
            let stripped = strip_ansi(raw);
            let line = strip_phase_tag(stripped.trim());
            if line.starts_with(PHASE_PREFIX) {
                in_detect = line == DETECT_HEADER;
                continue;
            }
            if !in_detect {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let (Some(id), rest) = (tokens.next(), tokens.count()) else {
                continue;
            };
            if rest <= 1 && is_buildpack_id(id) {
                let _ = participants.insert(id.to_string());
            }
        }
        participants
    }
}

/// Treats the first token after a fixed line prefix as a participant.
///
/// Suited to engines or buildpacks that announce themselves explicitly,
/// e.g. a prefix of `"Running buildpack "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMarkerParser {
    prefix: String,
}

impl LineMarkerParser {
    /// Creates a parser matching lines that start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ParticipationParser for LineMarkerParser {
    fn participants(&self, log: &str) -> BTreeSet<String> {
        log.lines()
            .filter_map(|raw| {
                let stripped = strip_ansi(raw);
                let line = strip_phase_tag(stripped.trim());
                line.strip_prefix(self.prefix.as_str())
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(ToString::to_string)
            })
            .collect()
    }
}

/// Removes ANSI escape sequences (colours, cursor movement, titles).
#[must_use]
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if line.contains('\u{1b}') {
        Cow::Owned(strip_ansi_escapes::strip_str(line))
    } else {
        Cow::Borrowed(line)
    }
}

// Drops a leading "[detector]"-style tag.
fn strip_phase_tag(line: &str) -> &str {
    line.strip_prefix('[')
        .and_then(|rest| rest.find(']').map(|end| rest[end + 1..].trim_start()))
        .unwrap_or(line)
}

fn is_buildpack_id(token: &str) -> bool {
    (token.contains('.') || token.contains('/'))
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '-' | '_' | '@'))
}
