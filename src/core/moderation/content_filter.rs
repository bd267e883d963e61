// Restricted-word filter for outgoing chat messages.

/// Matches whole words, ignoring case. "spam" hits "SPAM!" but not "spammer".
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    words: Vec<String>,
}

impl ContentFilter {
    pub fn new<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        let mut words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        words.sort();
        words.dedup();
        Self { words }
    }

    /// The first restricted word found in `body`, if any.
    pub fn find(&self, body: &str) -> Option<&str> {
        if self.words.is_empty() {
            return None;
        }
        body.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .find_map(|token| {
                self.words
                    .iter()
                    .find(|word| **word == token)
                    .map(String::as_str)
            })
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_whole_words_case_insensitively() {
        let filter = ContentFilter::new(["spam", "Abuse"]);

        assert_eq!(filter.find("this is SPAM!"), Some("spam"));
        assert_eq!(filter.find("no abuse, please"), Some("abuse"));
        assert_eq!(filter.find("the spammer left"), None);
        assert_eq!(filter.find("hello world"), None);
    }

    #[test]
    fn test_blank_and_duplicate_words_are_dropped() {
        let filter = ContentFilter::new(["  spam ", "", "SPAM"]);
        assert_eq!(filter.words(), &["spam".to_string()]);
    }

    #[test]
    fn test_an_empty_filter_never_matches() {
        let filter = ContentFilter::default();
        assert_eq!(filter.find("spam spam spam"), None);
    }
}
