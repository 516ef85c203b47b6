use crate::PromptError;
use crate::config::PersonaConfig;
use crate::memory::{RecalledMemory, UserIdentity};
use tera::{Context, Tera};

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are {{ persona_name }}. {{ persona_description }}

{% if intent %}The user's current intent appears to be: {{ intent }}.

{% endif %}{% if identity_lines %}What you know about this user:
{% for line in identity_lines %}- {{ line }}
{% endfor %}
{% endif %}{% if personal_lines %}Relevant personal memories (newest first):
{% for line in personal_lines %}- {{ line }}
{% endfor %}
{% endif %}{% if hive_lines %}Shared knowledge from other conversations:
{% for line in hive_lines %}- {{ line }}
{% endfor %}
{% endif %}Stay consistent with what you remember. If a memory conflicts with \
what the user says now, trust the user and treat the memory as outdated.";

/// Renders the dynamic system prompt from the immutable persona block plus
/// whatever identity and memory context this turn retrieved.
pub struct PromptBuilder {
    tera: Tera,
    persona: PersonaConfig,
}

impl PromptBuilder {
    pub fn new(persona: PersonaConfig) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template("system_prompt", SYSTEM_PROMPT_TEMPLATE)
            .map_err(|e| PromptError::Render(e.to_string()))?;
        Ok(Self { tera, persona })
    }

    pub fn build_system_prompt(
        &self,
        identity: Option<&UserIdentity>,
        personal_memories: &[RecalledMemory],
        hive_memories: &[RecalledMemory],
        intent: Option<&str>,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("persona_name", &self.persona.name);
        context.insert("persona_description", &self.persona.description);
        context.insert("intent", &intent);
        context.insert("identity_lines", &identity.map(identity_lines).filter(|l| !l.is_empty()));
        context.insert("personal_lines", &non_empty(memory_lines(personal_memories)));
        context.insert("hive_lines", &non_empty(memory_lines(hive_memories)));

        self.tera
            .render("system_prompt", &context)
            .map_err(|e| PromptError::Render(e.to_string()))
    }
}

fn non_empty(lines: Vec<String>) -> Option<Vec<String>> {
    if lines.is_empty() { None } else { Some(lines) }
}

fn memory_lines(memories: &[RecalledMemory]) -> Vec<String> {
    memories
        .iter()
        .map(|m| format!("[{}] {}", m.node.memory_type, m.node.content))
        .collect()
}

fn identity_lines(identity: &UserIdentity) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(name) = &identity.name {
        lines.push(format!("name: {name}"));
    }
    if let Some(origin) = &identity.origin {
        lines.push(format!("origin: {origin}"));
    }
    if let Some(role) = &identity.primary_role {
        lines.push(format!("role: {role}"));
    }
    if let Some(context) = &identity.current_context {
        lines.push(format!("context: {context}"));
    }
    for (key, value) in &identity.traits {
        lines.push(format!("{key}: {value}"));
    }
    lines
}
