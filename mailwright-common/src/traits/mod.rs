pub mod provider;
pub mod template;

pub use provider::Provider;
pub use template::TemplateEngine;
