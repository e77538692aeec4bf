//! Call-flow documents for the telephony provider and caller-reply parsing.
//!
//! The provider fetches a call-flow document when the patient answers,
//! gathers one key press or a spoken answer, and posts the result back
//! to `/api/handle-response`.

use reqwest::Url;

use crate::models::Outcome;

/// Seconds the gather waits for input.
pub const GATHER_TIMEOUT_SECS: u32 = 10;

const VOICE: &str = "alice";

const NO_INPUT_MESSAGE: &str = "I didn't receive a response. Please call your caregiver.";
const CONFIRMED_MESSAGE: &str = "Great! Thank you for taking your medication. Have a wonderful day!";
const DECLINED_MESSAGE: &str =
    "Please take your medication now. I'll call again in 5 minutes to check.";
const NOT_UNDERSTOOD_MESSAGE: &str =
    "I didn't understand your response. Please contact your caregiver.";

const YES_WORDS: &[&str] = &["yes", "yeah", "yep", "ok", "okay", "taken", "done"];
const NO_WORDS: &[&str] = &["no", "not", "nope", "haven't", "didn't"];

/// Provider call states that end a call without a gathered answer.
const UNANSWERED_TERMINAL_STATUSES: &[&str] =
    &["busy", "no-answer", "failed", "canceled", "completed"];

/// Spoken reminder question, shared by both transports.
pub fn reminder_message(medicine_name: &str) -> String {
    format!(
        "Hello! This is your medication reminder. Have you taken your {medicine_name}? \
         Press 1 if yes, press 2 if no, or say yes or no."
    )
}

/// Absolute gather action URL, falling back to a relative path when the
/// base is not a valid URL.
pub fn handle_response_url(public_base: &str, medicine_name: &str) -> String {
    let params = [("medicine", medicine_name)];
    match Url::parse_with_params(&format!("{public_base}/api/handle-response"), params) {
        Ok(url) => url.to_string(),
        Err(_) => {
            let relative = Url::parse_with_params("http://localhost/api/handle-response", params)
                .ok()
                .and_then(|url| url.query().map(|q| format!("/api/handle-response?{q}")));
            relative.unwrap_or_else(|| "/api/handle-response".to_string())
        }
    }
}

/// Call-flow document asking whether the dose was taken.
pub fn render_call_flow(medicine_name: &str, action_url: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            r#"<Gather input="dtmf speech" timeout="{timeout}" numDigits="1" speechTimeout="auto" action="{action}" method="POST">"#,
            r#"<Say voice="{voice}">{message}</Say>"#,
            "</Gather>",
            r#"<Say voice="{voice}">{fallback}</Say>"#,
            "<Hangup/>",
            "</Response>"
        ),
        timeout = GATHER_TIMEOUT_SECS,
        action = escape_xml(action_url),
        voice = VOICE,
        message = escape_xml(&reminder_message(medicine_name)),
        fallback = escape_xml(NO_INPUT_MESSAGE),
    )
}

/// Closing document after the caller answered (or failed to).
pub fn render_closing(outcome: Outcome) -> String {
    let message = match outcome {
        Outcome::Confirmed => CONFIRMED_MESSAGE,
        Outcome::Declined => DECLINED_MESSAGE,
        Outcome::TimedOut => NOT_UNDERSTOOD_MESSAGE,
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="{VOICE}">{}</Say><Hangup/></Response>"#,
        escape_xml(message)
    )
}

/// Classify a gathered reply.
///
/// Digits win over speech. In speech, any negative word wins over a
/// positive one, so "I have not taken it" reads as declined.
pub fn classify_reply(digits: Option<&str>, speech: Option<&str>) -> Outcome {
    match digits.map(str::trim) {
        Some("1") => return Outcome::Confirmed,
        Some("2") => return Outcome::Declined,
        _ => {}
    }

    let speech = speech.unwrap_or_default().to_lowercase();
    let words: Vec<&str> = speech
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| NO_WORDS.contains(w)) {
        Outcome::Declined
    } else if words.iter().any(|w| YES_WORDS.contains(w)) {
        Outcome::Confirmed
    } else {
        Outcome::TimedOut
    }
}

/// Whether a provider status ends the call with no answer to wait for.
pub fn is_unanswered_terminal(status: &str) -> bool {
    UNANSWERED_TERMINAL_STATUSES.contains(&status.trim().to_ascii_lowercase().as_str())
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_flow_contains_gather_and_fallback() {
        let action = handle_response_url("https://buddy.example.org", "Aspirin");
        let doc = render_call_flow("Aspirin", &action);
        assert!(doc.contains(r#"timeout="10""#));
        assert!(doc.contains(r#"numDigits="1""#));
        assert!(doc.contains("Have you taken your Aspirin?"));
        assert!(doc.contains(
            r#"action="https://buddy.example.org/api/handle-response?medicine=Aspirin""#
        ));
        assert!(doc.contains("Please call your caregiver."));
        assert!(doc.ends_with("<Hangup/></Response>"));
    }

    #[test]
    fn medicine_name_is_escaped_and_encoded() {
        let action = handle_response_url("http://127.0.0.1:3000", "Salt & <Pepper>");
        assert!(!action.contains(' '));
        let doc = render_call_flow("Salt & <Pepper>", &action);
        assert!(doc.contains("Salt &amp; &lt;Pepper&gt;"));
        assert!(!doc.contains("<Pepper>"));
    }

    #[test]
    fn bad_base_falls_back_to_relative_action() {
        let action = handle_response_url("not a url", "Vitamin D");
        assert!(action.starts_with("/api/handle-response?medicine=Vitamin"));
    }

    #[test]
    fn digits_classify() {
        assert_eq!(classify_reply(Some("1"), None), Outcome::Confirmed);
        assert_eq!(classify_reply(Some("2"), Some("yes")), Outcome::Declined);
        assert_eq!(classify_reply(Some("9"), None), Outcome::TimedOut);
    }

    #[test]
    fn speech_classifies() {
        assert_eq!(classify_reply(None, Some("Yes I did")), Outcome::Confirmed);
        assert_eq!(classify_reply(None, Some("okay, done.")), Outcome::Confirmed);
        assert_eq!(classify_reply(None, Some("Nope")), Outcome::Declined);
        assert_eq!(classify_reply(None, Some("I haven't")), Outcome::Declined);
        assert_eq!(classify_reply(None, Some("I have not taken it")), Outcome::Declined);
        assert_eq!(classify_reply(None, Some("I know")), Outcome::TimedOut);
        assert_eq!(classify_reply(None, None), Outcome::TimedOut);
    }

    #[test]
    fn closing_messages() {
        assert!(render_closing(Outcome::Confirmed).contains("Thank you for taking"));
        assert!(render_closing(Outcome::Declined).contains("call again in 5 minutes"));
        assert!(render_closing(Outcome::TimedOut).contains("didn&apos;t understand"));
    }

    #[test]
    fn terminal_statuses() {
        assert!(is_unanswered_terminal("no-answer"));
        assert!(is_unanswered_terminal("Busy"));
        assert!(!is_unanswered_terminal("ringing"));
        assert!(!is_unanswered_terminal("in-progress"));
    }
}
