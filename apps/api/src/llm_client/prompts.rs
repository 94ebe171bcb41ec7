// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it;
// this file only holds the cross-cutting pieces.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps verdicts tied to what the document actually says.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Base every field strictly on the candidate document provided. \
    Do NOT infer, interpolate, or invent details. \
    If the document does not state something, use null for optional fields \
    and count the skill as missing.";
