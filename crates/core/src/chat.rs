//! Conversation state of the analysis window.
//!
//! The transcript is append-only and lives as long as the window. Only the
//! newest question may be answered: submitting while a request is in flight
//! supersedes it, and the older answer is discarded when it arrives.

use std::fmt;
use std::path::{Path, PathBuf};

/// Question sent automatically when the window opens.
pub const INITIAL_QUESTION: &str = "Please analyze this image and describe what you see.";

/// Shown while an answer is pending.
pub const PENDING_NOTICE: &str = "AI is analyzing the image...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    You,
    Ai,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::You => f.write_str("You"),
            Speaker::Ai => f.write_str("AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered (speaker, text) entries.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push(Entry {
            speaker,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text of the most recent answer.
    pub fn last_answer(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.speaker == Speaker::Ai)
            .map(|e| e.text.as_str())
    }
}

/// A question handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: u64,
    pub question: String,
    /// The in-flight request this one replaces, if any.
    pub supersedes: Option<u64>,
}

/// One analysis window's worth of conversation about one image.
#[derive(Debug)]
pub struct ChatSession {
    image_path: PathBuf,
    transcript: Transcript,
    next_id: u64,
    in_flight: Option<u64>,
}

impl ChatSession {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            transcript: Transcript::default(),
            next_id: 1,
            in_flight: None,
        }
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// True while an answer is awaited.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Records a question. Blank questions are ignored.
    pub fn submit(&mut self, question: &str) -> Option<Submission> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        let supersedes = self.in_flight.replace(id);
        self.transcript.push(Speaker::You, question);

        Some(Submission {
            id,
            question: question.to_string(),
            supersedes,
        })
    }

    /// Records the answer to request `id`. Returns false for stale answers.
    pub fn resolve(&mut self, id: u64, answer: impl Into<String>) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        self.in_flight = None;
        self.transcript.push(Speaker::Ai, answer);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_trims_and_ignores_blank() {
        let mut session = ChatSession::new("/tmp/shot.png");
        assert!(session.submit("   ").is_none());
        assert!(session.transcript().is_empty());

        let submission = session.submit("  what is this?  ").unwrap();
        assert_eq!(submission.question, "what is this?");
        assert_eq!(submission.supersedes, None);
        assert!(session.is_pending());
        assert_eq!(
            session.transcript().entries(),
            &[Entry {
                speaker: Speaker::You,
                text: "what is this?".to_string()
            }]
        );
    }

    #[test]
    fn test_resolve_appends_answer() {
        let mut session = ChatSession::new("/tmp/shot.png");
        let first = session.submit(INITIAL_QUESTION).unwrap();
        assert!(session.resolve(first.id, "A cat."));
        assert!(!session.is_pending());
        assert_eq!(session.transcript().last_answer(), Some("A cat."));
    }

    #[test]
    fn test_newer_question_supersedes_older() {
        let mut session = ChatSession::new("/tmp/shot.png");
        let first = session.submit("one").unwrap();
        let second = session.submit("two").unwrap();
        assert_eq!(second.supersedes, Some(first.id));

        assert!(!session.resolve(first.id, "stale"));
        assert!(session.is_pending());
        assert!(session.resolve(second.id, "fresh"));

        let texts: Vec<_> = session
            .transcript()
            .entries()
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["one", "two", "fresh"]);
    }

    #[test]
    fn test_duplicate_answer_ignored() {
        let mut session = ChatSession::new("/tmp/shot.png");
        let s = session.submit("q").unwrap();
        assert!(session.resolve(s.id, "a"));
        assert!(!session.resolve(s.id, "a again"));
        assert_eq!(session.transcript().entries().len(), 2);
    }
}
