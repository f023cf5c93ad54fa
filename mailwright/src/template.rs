//! A small placeholder-substitution template engine.
//!
//! Templates contain `{{ path.to.value }}` placeholders which are looked up in
//! the JSON data passed to [`TemplateEngine::render`]. Values substituted into
//! templates whose name ends in `.html` are HTML-escaped.
//!
//! When loading a directory, a trailing `.txt` or `.tmpl` extension is
//! dropped from the file name, so `welcome.subject.txt` registers as
//! `welcome.subject` and `welcome.html` as `welcome.html`.

use std::path::Path;

use ahash::AHashMap;
use mailwright_common::{TemplateEngine, TemplateError};
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::TemplateConfig;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Vec<String>),
}

#[derive(Debug, Clone)]
struct Template {
    segments: Vec<Segment>,
    escape_html: bool,
}

impl Template {
    fn parse(name: &str, content: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = content;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after_open = &rest[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                return Err(TemplateError::Parse {
                    template: name.to_string(),
                    message: format!("unterminated placeholder at byte {}", offset + start),
                });
            };

            let key = after_open[..end].trim();
            if key.is_empty() || key.split('.').any(str::is_empty) {
                return Err(TemplateError::Parse {
                    template: name.to_string(),
                    message: format!("invalid placeholder {{{{{key}}}}} at byte {}", offset + start),
                });
            }
            segments.push(Segment::Placeholder(
                key.split('.').map(ToString::to_string).collect(),
            ));

            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            segments,
            escape_html: name.ends_with(".html"),
        })
    }

    fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let mut output = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(path) => {
                    let value = lookup(data, path).ok_or_else(|| TemplateError::Render {
                        template: name.to_string(),
                        message: format!("missing value for `{}`", path.join(".")),
                    })?;

                    let text = stringify(value);
                    if self.escape_html {
                        escape_html_into(&text, &mut output);
                    } else {
                        output.push_str(&text);
                    }
                }
            }
        }

        Ok(output)
    }
}

fn lookup<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(data, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Renders a JSON value as text: strings verbatim, `null` as nothing,
/// everything else as JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_html_into(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(c),
        }
    }
}

/// In-memory [`TemplateEngine`].
#[derive(Debug, Default)]
pub struct MemoryTemplateEngine {
    templates: RwLock<AHashMap<String, Template>>,
}

impl MemoryTemplateEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an engine from the `templates` section of the configuration,
    /// loading the directory first so inline templates override files.
    ///
    /// # Errors
    ///
    /// Any [`TemplateError`] raised while loading or parsing.
    pub fn from_config(config: &TemplateConfig) -> Result<Self, TemplateError> {
        let engine = Self::new();

        if let Some(directory) = &config.directory {
            engine.load_directory(directory)?;
        }

        for (name, content) in &config.inline {
            engine.register_template(name, content)?;
        }

        Ok(engine)
    }

    /// Registers every regular file in `directory`.
    ///
    /// Entries resolving outside `directory` (e.g. through symlinks) are
    /// rejected. Subdirectories are not descended into.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Io`] if the directory or a file cannot be read,
    /// [`TemplateError::Parse`] if a template is malformed.
    pub fn load_directory(&self, directory: impl AsRef<Path>) -> Result<usize, TemplateError> {
        let directory = directory.as_ref();
        let io_error = |path: &Path, err: std::io::Error| TemplateError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        };

        let root = directory
            .canonicalize()
            .map_err(|err| io_error(directory, err))?;
        let entries = std::fs::read_dir(&root).map_err(|err| io_error(&root, err))?;

        let mut loaded = 0;
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&root, err))?;
            let path = entry
                .path()
                .canonicalize()
                .map_err(|err| io_error(&entry.path(), err))?;

            if !path.starts_with(&root) {
                return Err(TemplateError::Io {
                    path: entry.path().display().to_string(),
                    message: "template resolves outside the template directory".to_string(),
                });
            }

            if !path.is_file() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str().map(ToString::to_string) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 template name");
                continue;
            };

            let name = file_name
                .strip_suffix(".txt")
                .or_else(|| file_name.strip_suffix(".tmpl"))
                .unwrap_or(&file_name);

            let content = std::fs::read_to_string(&path).map_err(|err| io_error(&path, err))?;
            self.register_template(name, &content)?;
            loaded += 1;
        }

        tracing::debug!(directory = %root.display(), loaded, "Loaded templates");
        Ok(loaded)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateEngine for MemoryTemplateEngine {
    fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let templates = self.templates.read();
        let template = templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        template.render(name, data)
    }

    fn register_template(&self, name: &str, content: &str) -> Result<(), TemplateError> {
        let template = Template::parse(name, content)?;
        self.templates.write().insert(name.to_string(), template);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_substitutes_nested_values() {
        let engine = MemoryTemplateEngine::new();
        engine
            .register_template(
                "welcome.text",
                "Hi {{ user.name }}, you have {{user.unread}} messages from {{ senders.0 }}.",
            )
            .unwrap();

        let rendered = engine
            .render(
                "welcome.text",
                &json!({ "user": { "name": "Ada", "unread": 3 }, "senders": ["Bob"] }),
            )
            .unwrap();

        assert_eq!(rendered, "Hi Ada, you have 3 messages from Bob.");
    }

    #[test]
    fn test_html_templates_escape_values() {
        let engine = MemoryTemplateEngine::new();
        engine
            .register_template("note.html", "<p>{{ body }}</p>")
            .unwrap();
        engine.register_template("note.text", "{{ body }}").unwrap();

        let data = json!({ "body": "<b>\"Tom\" & 'Jerry'</b>" });
        assert_eq!(
            engine.render("note.html", &data).unwrap(),
            "<p>&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;</p>"
        );
        assert_eq!(
            engine.render("note.text", &data).unwrap(),
            "<b>\"Tom\" & 'Jerry'</b>"
        );
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let engine = MemoryTemplateEngine::new();
        let err = engine.render("missing.html", &json!({})).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_value_is_render_error() {
        let engine = MemoryTemplateEngine::new();
        engine.register_template("t", "{{ absent }}").unwrap();

        let err = engine.render("t", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_unterminated_placeholder_is_parse_error() {
        let engine = MemoryTemplateEngine::new();
        let err = engine.register_template("t", "Hello {{ name").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        assert!(!engine.contains("t"));

        let err = engine.register_template("t", "Hello {{ a..b }}").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_null_renders_empty() {
        let engine = MemoryTemplateEngine::new();
        engine.register_template("t", "[{{ v }}]").unwrap();
        assert_eq!(engine.render("t", &json!({ "v": null })).unwrap(), "[]");
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("welcome.subject.txt"), "Welcome {{ name }}").unwrap();
        std::fs::write(dir.path().join("welcome.html"), "<h1>{{ name }}</h1>").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let engine = MemoryTemplateEngine::new();
        assert_eq!(engine.load_directory(dir.path()).unwrap(), 2);
        assert!(engine.contains("welcome.subject"));
        assert!(engine.contains("welcome.html"));
        assert_eq!(
            engine
                .render("welcome.subject", &json!({ "name": "Ada" }))
                .unwrap(),
            "Welcome Ada"
        );
    }

    #[test]
    fn test_from_config_inline_overrides_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("welcome.text.txt"), "from file").unwrap();

        let config = TemplateConfig {
            enabled: true,
            directory: Some(dir.path().to_path_buf()),
            inline: [("welcome.text".to_string(), "inline".to_string())]
                .into_iter()
                .collect(),
        };

        let engine = MemoryTemplateEngine::from_config(&config).unwrap();
        assert_eq!(engine.render("welcome.text", &json!({})).unwrap(), "inline");
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let engine = MemoryTemplateEngine::new();
        let err = engine.load_directory("/nonexistent/templates").unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
