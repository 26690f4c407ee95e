//! Mathis assembly generation on top of the router.

use crate::router::BackendRouter;

const MASM_TEMPLATE: &str = r#"Follow this exact format:
```masm
.module "module_name"
.version "1.0.0"

.constants:
    0: str "constant_value"

.func function_name
    .arity 0
    .locals 2
    .ai_block "block_name"
    .ai_intent "what this does"

    ; Your code here
    CONST_I64 0
    RET
.end
```

Output ONLY the code, no explanations."#;

/// Prompt asking for a `.masm` module implementing `description`.
pub fn masm_prompt(description: &str) -> String {
    format!("Generate Mathis assembly code (.masm) for: {description}\n\n{MASM_TEMPLATE}")
}

/// Body of the first fenced block whose info string equals `lang`
/// (case-insensitive). An empty `lang` matches any fence. An unterminated
/// block runs to the end of `text`.
pub fn extract_code_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let mut offset = 0;
    let mut body_start = None;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();

        match body_start {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    if lang.is_empty() || info.trim().eq_ignore_ascii_case(lang) {
                        body_start = Some(offset);
                    }
                }
            }
            Some(start) => {
                if trimmed.starts_with("```") {
                    return Some(text[start..line_start].trim_end());
                }
            }
        }
    }

    body_start.map(|start| text[start..].trim_end())
}

/// Ask the router for a module and keep only the code when the reply is
/// fenced; unfenced replies are returned whole.
pub async fn generate(router: &BackendRouter, description: &str) -> String {
    let reply = router.route(&masm_prompt(description)).await;
    match extract_code_block(&reply, "masm") {
        Some(code) => code.to_string(),
        None => reply.trim().to_string(),
    }
}
