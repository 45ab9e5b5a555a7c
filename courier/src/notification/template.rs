//! Template resolution and rendering.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::database::models::{ChannelType, TemplateDbModel};
use crate::database::repositories::TemplateRepository;
use crate::{Error, Result};

/// A CTA after variable substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedCta {
    pub label: String,
    /// Link handed to the transport; rewritten to a tracking URL before dispatch.
    pub action: String,
    pub style: String,
    /// Rendered link before tracking rewrite.
    #[serde(rename = "originalURL")]
    pub original_url: String,
}

/// Template output ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTemplate {
    pub subject: String,
    pub content: String,
    pub ctas: Vec<RenderedCta>,
}

/// Looks up the most specific active template for a delivery.
pub struct TemplateResolver {
    templates: Arc<dyn TemplateRepository>,
}

impl TemplateResolver {
    pub fn new(templates: Arc<dyn TemplateRepository>) -> Self {
        Self { templates }
    }

    /// Organization-scoped template first, then the global one.
    pub async fn find_template(
        &self,
        event_type: &str,
        channel_type: ChannelType,
        organization_id: &str,
    ) -> Result<TemplateDbModel> {
        if let Some(template) = self
            .templates
            .find_active(event_type, channel_type, Some(organization_id))
            .await?
        {
            return Ok(template);
        }

        self.templates
            .find_active(event_type, channel_type, None)
            .await?
            .ok_or_else(|| Error::TemplateNotFound {
                event_type: event_type.to_string(),
                channel_type: channel_type.to_string(),
            })
    }
}

/// Substitute payload values into subject, content and CTA links.
///
/// Only placeholders naming a declared variable are replaced. Substituted
/// values are never scanned again, so a value containing `{{x}}` stays literal.
pub fn render(template: &TemplateDbModel, payload: &Value) -> RenderedTemplate {
    let variables = template.variables.as_slice();
    let ctas = template
        .ctas
        .iter()
        .map(|cta| {
            let action = substitute(&cta.action, variables, payload);
            RenderedCta {
                label: cta.label.clone(),
                original_url: action.clone(),
                action,
                style: cta.style.clone(),
            }
        })
        .collect();

    RenderedTemplate {
        subject: substitute(&template.subject, variables, payload),
        content: substitute(&template.content, variables, payload),
        ctas,
    }
}

fn substitute(text: &str, variables: &[String], payload: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after_open[..end];
        if variables.iter().any(|v| v == name) {
            out.push_str(&stringify(payload.get(name)));
            rest = &after_open[end + 2..];
        } else {
            // Keep the braces and resume right after them so a nested
            // `{{{{x}}` still finds the inner placeholder.
            out.push_str("{{");
            rest = after_open;
        }
    }

    out.push_str(rest);
    out
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
