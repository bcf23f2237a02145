use std::collections::HashMap;

use anyhow::anyhow;

use super::messages::{EventValue, SemanticEvent};

/// Maps events to OSC addresses using `{{ field }}` templates keyed by the
/// event's result type.
pub struct AddressMapper {
    templates: HashMap<String, String>,
}

impl AddressMapper {
    pub fn new(templates: HashMap<String, String>) -> Self {
        AddressMapper { templates }
    }

    /// `Ok(None)` when no template is registered for the event; an error when
    /// the template names a field the event does not carry.
    pub fn map(&self, event: &SemanticEvent) -> anyhow::Result<Option<(String, EventValue)>> {
        let Some(template) = self.templates.get(event.result_type()) else {
            return Ok(None);
        };
        let address = render(template, event)?;
        Ok(Some((address, event.value())))
    }
}

fn render(template: &str, event: &SemanticEvent) -> anyhow::Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated placeholder in template '{}'", template))?;
        let name = after[..close].trim();
        let value = event.field(name).ok_or_else(|| {
            anyhow!(
                "{} event has no '{}' field required by template '{}'",
                event.result_type(),
                name,
                template
            )
        })?;
        rendered.push_str(value);
        rest = &after[close + 2..];
    }
    rendered.push_str(rest);

    Ok(rendered)
}
