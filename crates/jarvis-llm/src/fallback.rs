//! Offline responder that terminates every routing chain.
//!
//! Prompts are matched against a small keyword table; anything else falls
//! into the echo catch-all. The responder is a pure function and never fails.

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BackendClient, BackendRequest, BackendResult};

/// Canned reply selected for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canned {
    Filesystem,
    Command,
    Identity,
    /// Echo of the (truncated) prompt.
    CatchAll,
}

impl Canned {
    pub fn as_str(&self) -> &'static str {
        match self {
            Canned::Filesystem => "filesystem",
            Canned::Command    => "command",
            Canned::Identity   => "identity",
            Canned::CatchAll   => "catch_all",
        }
    }

    /// Fixed answer for a topic; `None` for the catch-all.
    pub fn answer(&self) -> Option<&'static str> {
        match self {
            Canned::Filesystem => Some(FILESYSTEM_ANSWER),
            Canned::Command    => Some(COMMAND_ANSWER),
            Canned::Identity   => Some(IDENTITY_ANSWER),
            Canned::CatchAll   => None,
        }
    }
}

const FILESYSTEM_ANSWER: &str = "\
For the filesystem, here is the code:

```masm
.module \"filesystem\"
.version \"1.0.0\"

.func fs_init
    .arity 0
    .locals 2
    .ai_block \"fs_init\"
    .ai_intent \"Initialize filesystem\"

    ; Reserve memory for file table
    CONST_I64 0x30000
    SET_LOCAL 0

    CONST_I64 0
    RET
.end
```";

const COMMAND_ANSWER: &str = "\
To add the jarvis command to the kernel:

1. Modify command_handler in kernel.asm
2. Add pattern matching for \"jarvis\"
3. Implement the serial communication";

const IDENTITY_ANSWER: &str = "\
MATHIS OS is an operating system created by Mathis Higuinen.
It uses the Mathis language (stack-based assembly with AI annotations).
It is fully self-contained, with no external dependencies.";

/// Ordered keyword rules; the first rule with a matching keyword wins.
pub struct TopicClassifier {
    rules: Vec<(Canned, Vec<String>)>,
}

fn rule(topic: Canned, words: &[&str]) -> (Canned, Vec<String>) {
    (topic, words.iter().map(|w| w.to_string()).collect())
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                rule(Canned::Filesystem, &["filesystem"]),
                rule(Canned::Command,    &["jarvis", "command"]),
                rule(Canned::Identity,   &["what is", "mathis"]),
            ],
        }
    }
}

impl TopicClassifier {
    pub fn classify(&self, prompt: &str) -> Canned {
        let lower = prompt.to_lowercase();
        self.rules
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map(|(topic, _)| *topic)
            .unwrap_or(Canned::CatchAll)
    }
}

pub const DEFAULT_ECHO_CHARS: usize = 100;

pub struct StaticResponder {
    classifier: TopicClassifier,
    echo_chars: usize,
}

impl Default for StaticResponder {
    fn default() -> Self {
        Self { classifier: TopicClassifier::default(), echo_chars: DEFAULT_ECHO_CHARS }
    }
}

impl StaticResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, prompt: &str) -> Canned {
        self.classifier.classify(prompt)
    }

    /// Always yields a non-empty reply.
    pub fn respond(&self, prompt: &str) -> String {
        let topic = self.classify(prompt);
        match topic.answer() {
            Some(answer) => answer.to_string(),
            None => {
                let echoed: String = prompt.trim().chars().take(self.echo_chars).collect();
                format!("[offline] I understood: {echoed}...")
            }
        }
    }
}

#[async_trait]
impl BackendClient for StaticResponder {
    async fn invoke(&self, req: &BackendRequest, _timeout: Duration) -> BackendResult {
        Ok(self.respond(req.prompt()))
    }

    fn name(&self) -> &str { "static" }
    fn is_local(&self) -> bool { true }
}
