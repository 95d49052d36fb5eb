use crate::collab::{GeneratedWord, Sender, ThreadMessage};
use crate::engine::word_store::QuizCategory;

/// The four posts that introduce a word: the opener, then three replies.
pub fn word_sequence(word: &GeneratedWord, affirmation: &str) -> Vec<String> {
    let mut messages = Vec::with_capacity(4);

    messages.push(format!("📚 Today's vocabulary word: *{}*", word.word));

    let mut meanings = String::from("*Meanings:*\n");
    for (i, meaning) in word.meanings.iter().enumerate() {
        meanings.push_str(&format!("{}. {meaning}\n", i + 1));
    }
    messages.push(meanings.trim_end().to_string());

    let mut examples = String::from("*Examples:*\n");
    for example in &word.examples {
        examples.push_str(&format!("• {example}\n"));
    }
    messages.push(examples.trim_end().to_string());

    messages.push(format!(
        "Did you already know this word?\n\
         • Reply '{affirmation}' if you already knew it\n\
         • Reply with any other message to learn it (ask a question, use it in a sentence \
         for feedback, or ask for a pronunciation breakdown)"
    ));

    messages
}

pub fn known_acknowledgement() -> &'static str {
    "Great! You already knew that word. I'll post a new word for you shortly."
}

pub fn new_word_coming() -> &'static str {
    "I'll post a new word for you shortly!"
}

pub fn word_already_waiting(word: &str) -> String {
    format!(
        "There's already a new word waiting for you! Please respond to '{word}' in its thread \
         before requesting another word."
    )
}

pub fn processing_error() -> &'static str {
    "I encountered an error processing your message. Please try again later."
}

/// Render thread history as `Bot:` / `User:` lines, skipping empty messages.
pub fn thread_context(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| {
            let who = match m.sender {
                Sender::Bot => "Bot",
                Sender::User(_) => "User",
            };
            format!("{who}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn quiz_question(word: &str, category: QuizCategory) -> String {
    match category {
        QuizCategory::MultipleChoice => format!(
            "Quiz: which of these best matches the meaning of *{word}*? Answer in your own \
             words or pick the closest meaning."
        ),
        QuizCategory::FreeTextMeaning => format!("Quiz: what does *{word}* mean?"),
        QuizCategory::ContextualUsage => {
            format!("Quiz: use *{word}* in a sentence of your own.")
        }
    }
}
