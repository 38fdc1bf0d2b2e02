//! Init-container template rendering
//!
//! The template is a YAML sequence of containers with two substitution points,
//! `{http_code}` and `{depends_on}`. Literal braces are written `{{` and `}}`.

use std::path::PathBuf;

use k8s_openapi::api::core::v1::Container;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Template shipped with the binary
pub const DEFAULT_TEMPLATE: &str = include_str!("../resources/init-dependency.yaml");

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),

    #[error("rendered template is not a container list: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("template defines no container")]
    NoContainer,
}

/// Where the template text comes from
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Embedded,
    File(PathBuf),
}

impl From<Option<PathBuf>> for TemplateSource {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Embedded, Self::File)
    }
}

/// Renders the init container injected in front of dependent pods
///
/// The template text is read on first use and cached. A failed read is not
/// cached, so the next event tries again.
pub struct InitContainerSynthesizer {
    source: TemplateSource,
    http_code: String,
    text: OnceCell<String>,
}

impl InitContainerSynthesizer {
    pub fn new(source: impl Into<TemplateSource>, http_code: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            http_code: http_code.into(),
            text: OnceCell::new(),
        }
    }

    async fn template(&self) -> Result<&str, TemplateError> {
        let text = self
            .text
            .get_or_try_init(|| async {
                match &self.source {
                    TemplateSource::Embedded => Ok(DEFAULT_TEMPLATE.to_string()),
                    TemplateSource::File(path) => {
                        debug!(path = %path.display(), "loading init container template");
                        tokio::fs::read_to_string(path)
                            .await
                            .map_err(|source| TemplateError::Io {
                                path: path.clone(),
                                source,
                            })
                    }
                }
            })
            .await?;

        Ok(text.as_str())
    }

    /// Renders the init container for `depends_on`
    ///
    /// The dependency list is comma-joined into a single value. Only the first
    /// container of the template is returned.
    pub async fn synthesize(&self, depends_on: &[String]) -> Result<Container, TemplateError> {
        let depends_on = depends_on.join(",");
        let rendered = render(
            self.template().await?,
            &[
                ("http_code", self.http_code.as_str()),
                ("depends_on", depends_on.as_str()),
            ],
        )?;

        let containers: Vec<Container> = serde_yaml::from_str(&rendered)?;
        let container = containers
            .into_iter()
            .next()
            .ok_or(TemplateError::NoContainer)?;

        info!(
            container = %container.name,
            depends_on = %depends_on,
            "adding init container for dependencies"
        );

        Ok(container)
    }
}

/// Substitutes `{name}` placeholders in `template` from `values`
fn render(template: &str, values: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let consumed = if tail.starts_with("{{") {
            out.push('{');
            2
        } else if tail.starts_with("}}") {
            out.push('}');
            2
        } else if tail.starts_with('}') {
            return Err(TemplateError::UnbalancedBrace(offset + pos));
        } else {
            let Some(end) = tail.find('}') else {
                return Err(TemplateError::UnbalancedBrace(offset + pos));
            };
            let name = &tail[1..end];
            let (_, value) = values
                .iter()
                .find(|(key, _)| *key == name)
                .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
            out.push_str(value);
            end + 1
        };

        rest = &tail[consumed..];
        offset += pos + consumed;
    }

    out.push_str(rest);
    Ok(out)
}
