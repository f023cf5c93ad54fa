use crate::error::TemplateError;

/// Renders named templates against a JSON data value.
pub trait TemplateEngine: Send + Sync {
    /// Renders `name` with `data`.
    ///
    /// # Errors
    ///
    /// [`TemplateError::NotFound`] when no template is registered under
    /// `name`; callers may treat that as an absent field.
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String, TemplateError>;

    /// Registers (or replaces) a template.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Parse`] if the content is malformed.
    fn register_template(&self, name: &str, content: &str) -> Result<(), TemplateError>;
}
