//! Prompt assembly for the assistant.
//!
//! Both builders are pure: structured profile/log data in, one text block out.
//! Nothing here talks to the network.

use crate::models::log_entry::LogEntry;
use crate::models::profile::Profile;

/// Most recent entries embedded in a chat prompt.
pub const CHAT_LOG_LIMIT: usize = 20;

/// Look-back window of the clinical summary, in days.
pub const SUMMARY_WINDOW_DAYS: i64 = 90;

pub const NO_RECENT_LOGS: &str = "No recent logs.";
pub const NO_WINDOW_LOGS: &str = "No health events logged in the past 90 days.";
const NOT_PROVIDED: &str = "Not provided.";

const CHAT_PREAMBLE: &str = r#"Persona: You are a health journaling companion. You are warm, calm and professional, and you help the user make sense of the health data they have recorded themselves.

Objectives:
  - For small talk, answer briefly and kindly, then offer help with anything health related.
  - When the user asks about their health, look for patterns across their history and logs. Offer general, evidence-based education from reputable public sources (CDC, FDA, NIH, Mayo Clinic) and non-prescriptive at-home wellness ideas such as sleep, diet, stress and habit adjustments. Help them prepare for doctor visits by summarizing what they logged.

Rules:
  1. You are not a doctor. Never diagnose, interpret test results, prescribe medication or recommend a treatment plan. Use cautious phrasing such as "entries like X and Y are sometimes associated with ..." and name the source.
  2. Only when your reply contains an actionable suggestion, end it with exactly: "This information is only helpful advice and is not a substitute for professional medical help. Please consult a healthcare provider for any health concerns." Purely conversational or summarizing replies do not get this line.
  3. Ground every statement in the data below. Do not invent symptoms or facts the user has not logged.
  4. If the user describes severe or potentially life-threatening symptoms (crushing chest pain, difficulty breathing, thoughts of self-harm), your only reply is to urge them to seek professional medical help immediately.
  5. Keep answers short, roughly three or four sentences, unless the user explicitly asks for more depth. Mention history only when it is relevant to the question."#;

const SUMMARY_PREAMBLE: &str = r#"[SYSTEM PROMPT]
Role: Medical scribe.
Goal: Produce a concise, objective clinical summary of the patient's self-reported data from the last 90 days, for a physician. Keep only what is relevant to the stated purpose of the visit.
Output format:
  1. Title: Patient Health Summary
  2. Reports from: [Start Date] - [End Date]
  3. Chronological log, oldest first, filtered by relevance to the visit purpose:
     YYYY-MM-DD: - bulleted objective reports, quoting the patient's own words for symptoms.

Rules:
  1. Transcribe facts only. Do not analyze, interpret, diagnose or suggest.
  2. Leave out anything older than 90 days before today.
  3. Include only log entries relevant to the purpose of the visit. If no purpose is stated, include every relevant entry.
  4. Use neutral clinical language and quote subjective descriptions (for example: reports feeling "fatigued")."#;

fn or_not_provided(text: &str) -> &str {
    if text.trim().is_empty() {
        NOT_PROVIDED
    } else {
        text
    }
}

fn chat_log_line(log: &LogEntry) -> String {
    format!(
        "- On {}: \"{}\" (Severity: {}). Description: {}.",
        log.log_date, log.title, log.severity, log.description
    )
}

fn summary_log_line(log: &LogEntry) -> String {
    let mut line = format!(
        "- {}: \"{}\". Description: {}. (Reported Severity: {}/10).",
        log.log_date, log.title, log.description, log.severity
    );
    if log.has_photo() {
        line.push_str(" [Photo available]");
    }
    line
}

fn render_lines(lines: Vec<String>, empty: &str) -> String {
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

/// Conversational prompt. `logs` is expected newest first; only the first
/// [`CHAT_LOG_LIMIT`] are used.
pub fn build_chat_prompt(profile: &Profile, logs: &[LogEntry], question: &str) -> String {
    let recent = render_lines(
        logs.iter().take(CHAT_LOG_LIMIT).map(chat_log_line).collect(),
        NO_RECENT_LOGS,
    );

    format!(
        "{preamble}\n\n\
         [USER CONTEXT DATA]\n\
         - Personal History: {personal}\n\
         - Family History: {family}\n\
         - Recent Logs:\n\
         {recent}\n\n\
         [USER'S CURRENT QUESTION]\n\
         {question}\n",
        preamble = CHAT_PREAMBLE,
        personal = or_not_provided(&profile.personal_history),
        family = or_not_provided(&profile.family_history),
        recent = recent,
        question = question.trim(),
    )
}

/// Clinical-summary prompt. `logs` is the 90-day window, oldest first. No
/// relevance filtering happens here; the instructions leave that to the model.
pub fn build_clinical_summary_prompt(
    profile: &Profile,
    logs: &[LogEntry],
    visit_purpose: Option<&str>,
) -> String {
    let purpose = visit_purpose
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("The patient's stated purpose for this visit is: \"{}\".", p))
        .unwrap_or_default();

    let window = render_lines(logs.iter().map(summary_log_line).collect(), NO_WINDOW_LOGS);

    format!(
        "{preamble}\n\n\
         [PATIENT DATA]\n\
         - Patient Background:\n\
         \x20 - Personal History: {personal}\n\
         \x20 - Family History: {family}\n\
         - Purpose of Visit: {purpose}\n\
         - Symptom & Activity Log (Past 90 Days):\n\
         {window}\n\n\
         [INSTRUCTION]\n\
         Generate the summary report based on the data above.\n",
        preamble = SUMMARY_PREAMBLE,
        personal = or_not_provided(&profile.personal_history),
        family = or_not_provided(&profile.family_history),
        purpose = purpose,
        window = window,
    )
}
