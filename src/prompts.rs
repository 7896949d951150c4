//! Instructions for every generative-collaborator call.
//!
//! Every call asks for a JSON object back; the shapes named here are the ones
//! [`crate::client::llm`] parses. Keeping the wording in one module means a
//! prompt tweak never touches retry or parsing code, and tests can inspect
//! the exact text sent for a given section list or column set.

/// Language every page is translated into before sectioning.
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";

/// System prompt for the per-page translation call.
///
/// Reply shape: `{"lang": "<source language>", "text": "<translated text>"}`.
pub fn translate_system_prompt(target_language: &str) -> String {
    format!(
        r#"You are a translator. Translate the given text into {target_language}.
If the text is already in {target_language}, return it unchanged.
You must remove the terms and conditions section if present before returning the output.

Output the translated text in the following JSON format and nothing else:

{{
    "lang": "<the language of the original text>",
    "text": "<the translated text>"
}}"#
    )
}

pub fn translate_user_prompt(text: &str) -> String {
    format!("The text to be translated: {text}")
}

/// System prompt for splitting one page into the schema's sections.
///
/// Reply shape: `{"<section>": "<text belonging to it>", ...}` with only the
/// sections present on the page.
pub fn sections_system_prompt(sections: &[String]) -> String {
    let list = sections
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You are a document analyzer. Your job is to split the given text as per the sections given.

The sections are: [{list}]

Copy the text belonging to each section verbatim. Leave out sections that do not appear in the text.
Output the sectioned text in the following JSON format and nothing else:

{{
    "section1": "Text belonging to section1",
    "section2": "Text belonging to section2"
}}"#
    )
}

pub fn sections_user_prompt(text: &str) -> String {
    format!("The text to be sectioned: {text}")
}

/// System prompt for the single-answer question-answering fallback.
///
/// Reply shape: `{"text": "<answer>", "score": <0..1>}`.
pub const ANSWER_SYSTEM_PROMPT: &str = r#"You are a document analyzer. Your job is to understand the given question and answer it as per the text given in a precise manner without any additional explanations.
If the text does not contain the answer, return an empty text with a score of 0.

Output the answer in the following JSON format and nothing else:

{
    "text": "<answer to the question>",
    "score": <number between 0 and 1 indicating the confidence of the answer>
}"#;

pub fn question_user_prompt(question: &str, text: &str) -> String {
    format!("The question: {question}\nThe text: {text}")
}

/// System prompt for list fields: one question, many structured answers.
///
/// Reply shape: `{"answers": [{"<col>": {"text": ..., "score": ...}, ...}, ...]}`.
pub fn multi_answer_system_prompt(columns: &[String]) -> String {
    let tuple = columns
        .iter()
        .map(|c| format!("\"{c}\": {{\"text\": \"<{c}>\", \"score\": <0..1>}}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You are a document analyzer. Your job is to understand the given question and find every answer to it in the text given, in the order they appear, without any additional explanations.
Each answer has the fields: {cols}. Every field carries a score between 0 and 1 indicating the confidence of that field.
If the text contains no answer, return an empty list.

Output the answers in the following JSON format and nothing else:

{{
    "answers": [ {{ {tuple} }} ]
}}"#,
        cols = columns.join(", "),
    )
}
