use async_trait::async_trait;

/// Classifies whether an utterance should end the conversation (spec §4.3
/// step 4). Left as a trait seam — a real implementation would be an
/// embedding-similarity classifier, out of scope per spec §1 ("only their
/// streaming I/O contracts are specified").
#[async_trait]
pub trait GoodbyeDetector: Send + Sync {
    async fn is_goodbye(&self, text: &str) -> bool;
}

/// Inline phrase-list implementation: case-insensitive substring match
/// against a configured set of closing phrases.
pub struct PhraseGoodbyeDetector {
    phrases: Vec<String>,
}

impl PhraseGoodbyeDetector {
    pub fn new(phrases: Vec<String>) -> Self {
        Self {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl Default for PhraseGoodbyeDetector {
    fn default() -> Self {
        Self::new(vec![
            "bye".to_string(),
            "goodbye".to_string(),
            "see you later".to_string(),
            "talk to you later".to_string(),
        ])
    }
}

#[async_trait]
impl GoodbyeDetector for PhraseGoodbyeDetector {
    async fn is_goodbye(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.phrases.iter().any(|phrase| lower.contains(phrase.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_configured_phrase_case_insensitively() {
        let detector = PhraseGoodbyeDetector::default();
        assert!(detector.is_goodbye("Okay, Bye!").await);
        assert!(!detector.is_goodbye("let's continue").await);
    }
}
