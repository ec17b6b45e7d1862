//! Automatic credential submission
//!
//! Best-effort: watches the data stream for a login prompt, then a password
//! prompt, and answers each once. A prompt is the trailing part of the
//! stream that has no line terminator yet and contains one of the
//! configured keywords, compared case-insensitively. It never holds back
//! data; the caller forwards every byte regardless of what this sees.

const MAX_LINE_LEN: usize = 256;

/// Keywords identifying each prompt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptKeywords {
    pub login: Vec<String>,
    pub password: Vec<String>,
}

impl Default for PromptKeywords {
    fn default() -> Self {
        Self {
            login: vec!["login".to_string(), "username".to_string()],
            password: vec!["password".to_string()],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginStage {
    AwaitLogin,
    AwaitPassword,
    Done,
}

#[derive(Debug)]
pub struct CredentialResponder {
    stage: LoginStage,
    username: String,
    password: String,
    login_keywords: Vec<String>,
    password_keywords: Vec<String>,
    line_ending: String,
    /// Lowercased bytes since the last line terminator, newest
    /// `MAX_LINE_LEN` only
    line: Vec<u8>,
}

impl CredentialResponder {
    /// Disabled unless both a username and a password are given.
    pub fn new(
        username: Option<&str>,
        password: Option<&str>,
        keywords: &PromptKeywords,
        line_ending: &str,
    ) -> Self {
        let (stage, username, password) = match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => {
                (LoginStage::AwaitLogin, u.to_string(), p.to_string())
            }
            _ => (LoginStage::Done, String::new(), String::new()),
        };

        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .filter(|w| !w.is_empty())
                .map(|w| w.to_lowercase())
                .collect()
        };

        Self {
            stage,
            username,
            password,
            login_keywords: lower(&keywords.login),
            password_keywords: lower(&keywords.password),
            line_ending: line_ending.to_string(),
            line: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    pub fn stage(&self) -> LoginStage {
        self.stage
    }

    /// Feed data bytes. Returns the text to transmit when a prompt matched.
    pub fn observe(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if self.stage == LoginStage::Done {
            return None;
        }

        for &b in data {
            match b {
                b'\r' | b'\n' => self.line.clear(),
                _ => self.line.push(b.to_ascii_lowercase()),
            }
        }
        // Screens drawn with cursor addressing never end a line; keep the tail
        if self.line.len() > MAX_LINE_LEN {
            let excess = self.line.len() - MAX_LINE_LEN;
            self.line.drain(..excess);
        }

        if self.line.is_empty() {
            return None;
        }

        let (keywords, secret, next) = match self.stage {
            LoginStage::AwaitLogin => (&self.login_keywords, &self.username, LoginStage::AwaitPassword),
            LoginStage::AwaitPassword => (&self.password_keywords, &self.password, LoginStage::Done),
            LoginStage::Done => return None,
        };

        if !keywords.iter().any(|k| contains(&self.line, k.as_bytes())) {
            return None;
        }

        let mut reply = secret.as_bytes().to_vec();
        reply.extend_from_slice(self.line_ending.as_bytes());

        tracing::info!("Prompt matched at {:?}, submitting credential", self.stage);
        self.stage = next;
        self.line.clear();

        Some(reply)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> CredentialResponder {
        CredentialResponder::new(Some("bob"), Some("hunter2"), &PromptKeywords::default(), "\r\n")
    }

    #[test]
    fn test_login_then_password() {
        let mut r = responder();

        assert_eq!(r.observe(b"Welcome to the BBS\r\n"), None);
        assert_eq!(r.observe(b"Login: "), Some(b"bob\r\n".to_vec()));
        assert_eq!(r.stage(), LoginStage::AwaitPassword);

        assert_eq!(r.observe(b"bob\r\n"), None);
        assert_eq!(r.observe(b"PASSWORD: "), Some(b"hunter2\r\n".to_vec()));
        assert_eq!(r.stage(), LoginStage::Done);

        assert_eq!(r.observe(b"\r\nlogin: "), None);
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut r = responder();

        assert_eq!(r.observe(b"\r\nuser"), None);
        assert_eq!(r.observe(b"name: "), Some(b"bob\r\n".to_vec()));
    }

    #[test]
    fn test_completed_lines_do_not_match() {
        let mut r = responder();
        assert_eq!(r.observe(b"Please login below\r\n"), None);
        assert_eq!(r.stage(), LoginStage::AwaitLogin);
    }

    #[test]
    fn test_prompt_at_end_of_long_unterminated_screen() {
        let mut r = responder();

        let mut screen = String::new();
        for row in 1..=20 {
            screen.push_str(&format!("\x1b[{};1H\x1b[1;34m====\x1b[0m", row));
        }
        assert!(screen.len() > MAX_LINE_LEN);
        assert_eq!(r.observe(screen.as_bytes()), None);

        assert_eq!(r.observe(b"\x1b[22;1HEnter your login: "), Some(b"bob\r\n".to_vec()));
    }

    #[test]
    fn test_long_prompt_in_one_chunk() {
        let mut r = responder();

        let mut screen = "\x1b[1;1H=".repeat(60);
        screen.push_str("\x1b[22;1HEnter your login: ");
        assert_eq!(r.observe(screen.as_bytes()), Some(b"bob\r\n".to_vec()));
    }

    #[test]
    fn test_disabled_without_both_credentials() {
        let mut r = CredentialResponder::new(Some("bob"), None, &PromptKeywords::default(), "\r\n");
        assert_eq!(r.stage(), LoginStage::Done);
        assert_eq!(r.observe(b"login: "), None);

        let mut r = CredentialResponder::new(None, Some("pw"), &PromptKeywords::default(), "\r\n");
        assert_eq!(r.observe(b"login: "), None);
    }

    #[test]
    fn test_custom_keywords() {
        let keywords = PromptKeywords {
            login: vec!["Handle".to_string()],
            password: vec!["Secret".to_string()],
        };
        let mut r = CredentialResponder::new(Some("bob"), Some("pw"), &keywords, "\r");

        assert_eq!(r.observe(b"login: "), None);
        assert_eq!(r.observe(b"\r\nEnter your handle: "), Some(b"bob\r".to_vec()));
        assert_eq!(r.observe(b"\r\nsecret? "), Some(b"pw\r".to_vec()));
    }
}
