//! Field and list resolution.
//!
//! [`resolve_fields`] answers a run of single-answer fields through an
//! [`AnswerSource`] (normally the confidence gate). [`resolve_list`] asks one
//! open-ended question for a repeated field and maps the reply onto the
//! list's columns. Lists never touch the local extractor: a single best span
//! cannot represent several ports.

use crate::answer::{AnswerContext, AnswerOrigin, AnswerSource, Sourced};
use crate::client::GenerativeClient;
use crate::error::ClientError;
use crate::output::{FieldAnswer, ListEntry};
use crate::pipeline::normalize::normalize;
use tracing::debug;

/// Build the question for `field`.
///
/// Qualifiers go innermost first: `question_for("name", &["shipper",
/// "parties_information"])` is "What is the name of the shipper of the
/// parties_information?". With no qualifiers it is the flat form.
pub fn question_for(field: &str, qualifiers: &[&str]) -> String {
    let mut q = format!("What is the {}", field);
    for qualifier in qualifiers {
        q.push_str(" of the ");
        q.push_str(qualifier);
    }
    q.push('?');
    q
}

/// Resolve every field in `fields` against one section.
///
/// Returns answers in `fields` order. A source with nothing to say yields a
/// zero-confidence placeholder attributed to the fallback. The first failed
/// call stops the run and is returned.
pub async fn resolve_fields(
    source: &dyn AnswerSource,
    fields: &[&str],
    qualifiers: &[&str],
    section_text: &str,
    document_text: &str,
) -> Result<Vec<(String, Sourced)>, ClientError> {
    let section_text = normalize(section_text);
    let document_text = normalize(document_text);
    let ctx = AnswerContext {
        section_text: &section_text,
        document_text: &document_text,
    };

    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let question = question_for(field, qualifiers);
        let sourced = source.answer(&question, &ctx).await?.unwrap_or(Sourced {
            answer: FieldAnswer::placeholder(),
            origin: AnswerOrigin::Fallback,
        });
        debug!(
            "{} → {:?} ({:.2}, {:?})",
            question, sourced.answer.value, sourced.answer.confidence, sourced.origin
        );
        out.push((field.to_string(), sourced));
    }
    Ok(out)
}

/// Resolve a list field with one generative call over the whole document.
pub async fn resolve_list(
    client: &dyn GenerativeClient,
    question: &str,
    columns: &[String],
    document_text: &str,
) -> Result<Vec<ListEntry>, ClientError> {
    let document_text = normalize(document_text);
    let tuples = client
        .find_multiple_answers(question, columns, &document_text)
        .await?;

    let entries: Vec<ListEntry> = tuples
        .into_iter()
        .map(|tuple| {
            ListEntry(
                columns
                    .iter()
                    .map(|col| {
                        let answer = tuple
                            .iter()
                            .find(|(k, _)| k == col)
                            .map(|(_, v)| FieldAnswer::new(v.text.clone(), v.score))
                            .unwrap_or_else(FieldAnswer::placeholder);
                        (col.clone(), answer)
                    })
                    .collect(),
            )
        })
        .collect();

    debug!("{} → {} entries", question, entries.len());
    Ok(entries)
}
