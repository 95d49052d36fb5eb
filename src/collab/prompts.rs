use crate::engine::difficulty::GenerationRequest;

pub const SYSTEM_PROMPT: &str = "You are an expert vocabulary tutor helping users expand their \
English vocabulary. Maintain an encouraging and educational tone. Keep conversations focused on \
vocabulary learning.";

fn list_or_none(words: &[String]) -> String {
    if words.is_empty() {
        "None".to_string()
    } else {
        words.join(", ")
    }
}

fn difficulty_guidance(known_ratio: f64) -> &'static str {
    if known_ratio >= 0.75 {
        "The user already knew most recent words. Pick a noticeably harder word than the ones they knew."
    } else if known_ratio >= 0.4 {
        "Generate a word of the same difficulty level as the words the user had to learn; it should be above the level of the words they already knew."
    } else {
        "The user had to learn most recent words. Stay at the level of the words they had to learn; do not go harder."
    }
}

pub fn word_generation_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Generate a **new** English vocabulary word for the user to learn.\n\n\
         EXISTING WORDS (DO NOT REPEAT ANY OF THESE):\n{}\n\n\
         WORDS THE USER ALREADY KNEW:\n{}\n\n\
         WORDS THE USER HAD TO LEARN:\n{}\n\n\
         DIFFICULTY GUIDANCE (share of words already known: {:.0}%):\n{}\n",
        list_or_none(&request.existing_words),
        list_or_none(&request.known_words),
        list_or_none(&request.learned_words),
        request.known_ratio * 100.0,
        difficulty_guidance(request.known_ratio),
    );

    if !request.rejected.is_empty() {
        prompt.push_str(&format!(
            "\nYou already suggested these words and they were rejected as duplicates: {}\n",
            request.rejected.join(", ")
        ));
    }
    if let Some(theme) = &request.theme {
        prompt.push_str(&format!("\nThe word should be related to the theme: {theme}\n"));
    }

    prompt.push_str(
        "\nThe word must be a real, useful English word that is not obscure or archaic. \
         Give meanings from trustworthy sources only.\n\n\
         Respond ONLY with a JSON object, no markdown, in this exact shape:\n\
         {\"word\": \"...\", \"meanings\": [\"...\"], \"examples\": [\"...\", \"...\", \"...\"]}",
    );
    prompt
}

pub fn tutor_prompt(
    thread_context: &str,
    latest_message: &str,
    word: &str,
    theme: Option<&str>,
    affirmation: &str,
) -> String {
    let theme_line = theme
        .map(|t| format!("The current vocabulary theme is: {t}\n"))
        .unwrap_or_default();
    format!(
        "You are a helpful vocabulary tutor in a conversation about the word \"{word}\".\n\
         {theme_line}\n\
         Conversation so far:\n{thread_context}\n\n\
         The user just said:\n{latest_message}\n\n\
         Answer questions about the word clearly. If they used the word in a sentence, say \
         whether it was correct and why. If they are off-topic, gently steer back to the word. \
         Keep it to 2-3 sentences. End with: \"Let me know if you have more questions. If you \
         want a new word, just reply with '{affirmation}' in the newest word's thread.\""
    )
}

pub fn judge_prompt(response: &str, reference_context: &str, tolerance: &str) -> String {
    format!(
        "Grade a vocabulary quiz answer.\n\n\
         Reference:\n{reference_context}\n\n\
         Learner's answer:\n{response}\n\n\
         Grading tolerance: {tolerance}. Accept paraphrases and minor spelling mistakes unless \
         the tolerance is strict.\n\n\
         Respond ONLY with JSON: {{\"correct\": true|false, \"feedback\": \"one short sentence\"}}"
    )
}
