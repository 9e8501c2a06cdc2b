//! The generated artifact bundle and prompt assembly for the designer
//! capability.
//!
//! Designer backends reply either with explicit `html`/`css`/`js` JSON
//! fields or with one text field carrying fenced code blocks; both forms
//! parse into the same [`Artifact`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Structured bundle of generated sub-files for one prototype.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl Artifact {
    /// Parse a designer output payload.
    ///
    /// Tries explicit fields first (`html`/`css`/`js`, with the
    /// `*_code` spellings as aliases), then fenced code blocks inside a
    /// text field. Returns `None` when no markup can be recovered.
    pub fn from_designer_output(output: &Value) -> Option<Self> {
        if let Some(artifact) = Self::from_fields(output) {
            return Some(artifact);
        }

        // A bare string, or a response/result text field with fences.
        let text = output.as_str().map(str::to_string).or_else(|| {
            ["response", "result", "content"]
                .iter()
                .find_map(|key| output.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })?;
        Self::from_fenced(&text)
    }

    fn from_fields(output: &Value) -> Option<Self> {
        let field = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|n| output.get(n).and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string()
        };
        let artifact = Self {
            html: field(["html", "html_code"]),
            css: field(["css", "css_code"]),
            js: field(["js", "js_code"]),
        };
        (!artifact.html.trim().is_empty()).then_some(artifact)
    }

    /// Extract ```html / ```css / ```javascript fenced blocks from text.
    pub fn from_fenced(text: &str) -> Option<Self> {
        let html = fenced_block(text, &["html"])?;
        let css = fenced_block(text, &["css"]).unwrap_or_default();
        let js = fenced_block(text, &["javascript", "js"]).unwrap_or_default();
        Some(Self { html, css, js })
    }

    /// Assemble the bundle into one self-contained HTML document, used
    /// both for headless rendering and as the final deliverable.
    pub fn to_page(&self) -> String {
        format!(
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n\
             <meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>Prototype</title>\n\
             <style>\n{css}\n</style>\n\
             </head>\n\
             <body>\n{html}\n\
             <script>\n{js}\n</script>\n\
             </body>\n\
             </html>\n",
            css = self.css,
            html = self.html,
            js = self.js,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

/// First fenced block tagged with any of `tags`.
fn fenced_block(text: &str, tags: &[&str]) -> Option<String> {
    for tag in tags {
        let fence = format!("```{tag}");
        let Some(start) = text.find(&fence) else {
            continue;
        };
        let rest = &text[start + fence.len()..];
        // The tag must end the fence line, so "```js" does not match "```json".
        let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
            continue;
        };
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim_end().to_string());
        }
    }
    None
}

/// Compose the designer input payload: requirements plus, on revision
/// iterations, the prior artifact and the validator's feedback.
pub fn build_designer_input(
    requirements: &str,
    prior: Option<&Artifact>,
    feedback: Option<&str>,
) -> Value {
    match (prior, feedback) {
        (Some(artifact), Some(feedback)) => json!({
            "requirements": requirements,
            "previous": {
                "html": artifact.html,
                "css": artifact.css,
                "js": artifact.js,
            },
            "feedback": feedback,
        }),
        _ => json!({ "requirements": requirements }),
    }
}
