// Prompt constants for bullet rewriting.
// Templates use `{placeholder}` substitution; see `build_rewrite_prompt` in the orchestrator.

/// Common instruction appended to every rewrite context.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Rewrite ONLY what the original bullet states. Do NOT invent metrics, \
    tools, employers, team sizes or outcomes. If a job keyword is not supported by \
    the original bullet, leave it out.";

/// System context for rewrite calls. Replace `{grounding_instruction}` and `{job_description}`.
pub const REWRITE_CONTEXT_TEMPLATE: &str = r#"You are an expert resume writer tailoring a single resume bullet to a target job.
You MUST respond with the rewritten bullet text only: one line, no quotes, no markdown, no explanations.

{grounding_instruction}

TARGET JOB DESCRIPTION:
{job_description}"#;

/// Per-bullet rewrite prompt. Replace `{language}`, `{keywords}`, `{bullet}`.
pub const REWRITE_PROMPT_TEMPLATE: &str = r#"Rewrite the resume bullet below for the target job.

Output language: {language}
Job keywords to use where the bullet genuinely supports them: {keywords}

Rules:
1. Start with a strong past-tense action verb (present tense only for a current role)
2. Keep every number and named technology from the original
3. At most 30 words, a single sentence
4. Write in the output language even if the original is in another language

ORIGINAL BULLET:
{bullet}"#;
