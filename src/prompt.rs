//! System prompt synthesis.
//!
//! [`synthesize`] is pure: every context block is fetched beforehand and passed in
//! through [`PromptInputs`]. Empty blocks are left out entirely and the remaining
//! sections are separated by a blank line.

use serde::Serialize;

use crate::memory::types::{Persona, SafetyLevel};

const CHILD_SAFETY: &str = "[SAFETY MODE: CHILD]\n\
- Audience is under 12 years old\n\
- STRICTLY FORBIDDEN: Profanity, violence, sexual themes, dark topics\n\
- Tone: Encouraging, simple, wholesome";

const SINGLE_INSTRUCTIONS: &str = "[INSTRUCTIONS]:\n\
- Stay in character at all times\n\
- If user shares critical information (medical, preferences, identity), output: [SAVE_FACT: type | content]\n\
- Be natural, avoid robotic phrases\n\
- Adjust formality based on relationship level";

const MULTI_PREAMBLE: &str = "[MULTI-PERSONA COLLABORATION MODE]\n\
You are a GROUP of AI personas working together to help the user:";

const COLLABORATION_RULES: &str = "[COLLABORATION RULES]:\n\
- Take turns speaking naturally\n\
- Use your unique voice and personality\n\
- Support each other's contributions\n\
- You can disagree, joke, or build on each other's ideas\n\
- Prefix your responses with your name in brackets, e.g., [Rem]: or [Sonic]:\n\
- Work as a team to provide the best answer";

/// What the prompt needs to know about one active persona.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaProfile {
    pub name: String,
    pub system_prompt: String,
    pub safety_level: SafetyLevel,
    /// Locket contents, in stored order.
    pub lockets: Vec<String>,
}

impl PersonaProfile {
    pub fn from_persona(persona: &Persona, lockets: Vec<String>) -> Self {
        Self {
            name: persona.name.clone(),
            system_prompt: persona.system_prompt.clone(),
            safety_level: persona.safety_level,
            lockets,
        }
    }
}

/// Pre-fetched context for one prompt. Blocks are already rendered; an empty
/// string means "nothing to say".
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub personas: Vec<PersonaProfile>,
    pub shared_facts: String,
    /// Only used with a single persona.
    pub relationship: String,
    /// Only used with a single persona.
    pub handoff: String,
    pub memories: String,
}

fn push_block(sections: &mut Vec<String>, header: &str, body: &str) {
    let body = body.trim();
    if !body.is_empty() {
        sections.push(format!("{header}:\n{body}"));
    }
}

fn push_raw(sections: &mut Vec<String>, block: &str) {
    let block = block.trim();
    if !block.is_empty() {
        sections.push(block.to_string());
    }
}

fn bullet_list(items: &[String], indent: &str) -> String {
    items
        .iter()
        .map(|item| format!("{indent}- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn identity(persona: &PersonaProfile) -> String {
    let mut lines = vec!["[IDENTITY]".to_string()];
    if !persona.system_prompt.trim().is_empty() {
        lines.push(persona.system_prompt.trim().to_string());
    }
    lines.push(format!("Name: {}", persona.name));
    lines.push(format!("Safety Level: {}", persona.safety_level));
    lines.join("\n")
}

fn single(persona: &PersonaProfile, inputs: &PromptInputs) -> Vec<String> {
    let mut sections = vec![identity(persona)];

    if persona.safety_level == SafetyLevel::Child {
        sections.push(CHILD_SAFETY.to_string());
    }
    push_raw(&mut sections, &inputs.relationship);
    push_raw(&mut sections, &inputs.handoff);
    push_block(&mut sections, "[SHARED FACTS ABOUT THE USER]", &inputs.shared_facts);
    push_block(
        &mut sections,
        "[IMMUTABLE TRUTHS - THE LOCKET]",
        &bullet_list(&persona.lockets, ""),
    );
    push_block(&mut sections, "[RECALLED MEMORIES]", &inputs.memories);
    sections.push(SINGLE_INSTRUCTIONS.to_string());
    sections
}

fn multi(inputs: &PromptInputs) -> Vec<String> {
    let mut sections = vec![MULTI_PREAMBLE.to_string()];

    for persona in &inputs.personas {
        let mut lines = vec![format!("=== {} ===", persona.name.to_uppercase())];
        if !persona.system_prompt.trim().is_empty() {
            lines.push(persona.system_prompt.trim().to_string());
        }
        lines.push(format!("Safety Level: {}", persona.safety_level));
        sections.push(lines.join("\n"));
    }

    let truths = inputs
        .personas
        .iter()
        .filter(|p| !p.lockets.is_empty())
        .map(|p| format!("{}:\n{}", p.name, bullet_list(&p.lockets, "  ")))
        .collect::<Vec<_>>()
        .join("\n");
    push_block(&mut sections, "[IMMUTABLE TRUTHS FOR EACH PERSONA]", &truths);
    push_block(&mut sections, "[SHARED FACTS ABOUT THE USER]", &inputs.shared_facts);
    push_block(&mut sections, "[RECALLED MEMORIES]", &inputs.memories);
    sections.push(COLLABORATION_RULES.to_string());
    sections
}

/// Build the system prompt. Uses collaboration mode when more than one persona
/// is active, which drops the relationship and handoff blocks.
pub fn synthesize(inputs: &PromptInputs) -> String {
    let sections = match inputs.personas.as_slice() {
        [persona] => single(persona, inputs),
        [] => vec![SINGLE_INSTRUCTIONS.to_string()],
        _ => multi(inputs),
    };
    sections.join("\n\n")
}
