//! Document assembly: walk the schema and resolve every section.
//!
//! The walk is generic. For each node list it resolves the plain fields in
//! one [`resolve_fields`] run, recurses into groups with a longer qualifier
//! chain and sends lists to [`resolve_list`]. Results are then laid out in
//! schema order, so the record's key order never depends on timing.
//!
//! Qualifier chains: fields directly under a section use the flat question;
//! a group `g` under section `s` asks "... of the g of the s?"; a group
//! nested in `g` prepends its own name.
//!
//! Sections are independent. When a call made for one section fails, that
//! section is filled with placeholders, the failure is recorded and the next
//! section is still attempted.

use crate::answer::{AnswerOrigin, AnswerSource};
use crate::client::GenerativeClient;
use crate::error::{ClientError, SectionError};
use crate::output::{ExtractedNode, ExtractionResult, FieldAnswer, SectionFailure};
use crate::pipeline::aggregate::SectionMap;
use crate::pipeline::resolve::{resolve_fields, resolve_list};
use crate::progress::ExtractionProgressCallback;
use crate::schema::{NodeKind, Schema, SchemaNode};
use futures::future::{BoxFuture, FutureExt};
use tracing::{info, warn};

/// Counters gathered while resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveCounts {
    pub sections_resolved: usize,
    pub fields_resolved: usize,
    pub local_answers: usize,
    pub fallback_answers: usize,
    pub list_entries: usize,
}

impl ResolveCounts {
    fn merge(&mut self, other: ResolveCounts) {
        self.sections_resolved += other.sections_resolved;
        self.fields_resolved += other.fields_resolved;
        self.local_answers += other.local_answers;
        self.fallback_answers += other.fallback_answers;
        self.list_entries += other.list_entries;
    }
}

/// The assembled record plus what went wrong along the way.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub record: ExtractionResult,
    pub failures: Vec<SectionFailure>,
    pub counts: ResolveCounts,
}

struct Texts<'t> {
    section: &'t str,
    document: &'t str,
}

/// Resolves a schema against aggregated sections.
pub struct Assembler<'a> {
    source: &'a dyn AnswerSource,
    client: &'a dyn GenerativeClient,
    progress: Option<&'a dyn ExtractionProgressCallback>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        source: &'a dyn AnswerSource,
        client: &'a dyn GenerativeClient,
        progress: Option<&'a dyn ExtractionProgressCallback>,
    ) -> Self {
        Self {
            source,
            client,
            progress,
        }
    }

    /// Resolve every section of `schema`, in schema order.
    ///
    /// Sections missing from `sections` are resolved against empty text.
    pub async fn assemble(&self, schema: &Schema, sections: &SectionMap) -> Assembled {
        let document = sections.document_text();
        let mut record = ExtractionResult::default();
        let mut failures = Vec::new();
        let mut counts = ResolveCounts::default();

        for spec in schema.sections() {
            if let Some(cb) = self.progress {
                cb.on_section_start(&spec.name);
            }

            let texts = Texts {
                section: sections.text_or_empty(&spec.name),
                document: &document,
            };
            let mut local = ResolveCounts::default();

            let node = match self
                .resolve_nodes(&spec.nodes, Vec::new(), vec![spec.name.as_str()], &texts, &mut local)
                .await
            {
                Ok(children) => {
                    let node = ExtractedNode::Group(children);
                    local.sections_resolved = 1;
                    counts.merge(local);
                    info!("Section '{}' resolved", spec.name);
                    if let Some(cb) = self.progress {
                        cb.on_section_complete(&spec.name, node.leaves().len());
                    }
                    node
                }
                Err(e) => {
                    let error = SectionError::from_client(&spec.name, e);
                    warn!("{}", error);
                    if let Some(cb) = self.progress {
                        cb.on_section_error(&spec.name, &error.to_string());
                    }
                    failures.push(SectionFailure {
                        section: spec.name.clone(),
                        error,
                    });
                    ExtractedNode::Group(placeholder_nodes(&spec.nodes))
                }
            };

            record.sections.push((spec.name.clone(), node));
        }

        Assembled {
            record,
            failures,
            counts,
        }
    }

    fn resolve_nodes<'b>(
        &'b self,
        nodes: &'b [SchemaNode],
        field_qualifiers: Vec<&'b str>,
        group_base: Vec<&'b str>,
        texts: &'b Texts<'b>,
        counts: &'b mut ResolveCounts,
    ) -> BoxFuture<'b, Result<Vec<(String, ExtractedNode)>, ClientError>> {
        async move {
            let fields: Vec<&str> = nodes
                .iter()
                .filter(|n| matches!(n.kind, NodeKind::Field))
                .map(|n| n.name.as_str())
                .collect();

            let mut answers = if fields.is_empty() {
                Vec::new()
            } else {
                resolve_fields(
                    self.source,
                    &fields,
                    &field_qualifiers,
                    texts.section,
                    texts.document,
                )
                .await?
            }
            .into_iter();

            let mut out = Vec::with_capacity(nodes.len());
            for node in nodes {
                let resolved = match &node.kind {
                    NodeKind::Field => {
                        let (_, sourced) = answers.next().ok_or_else(|| {
                            ClientError::malformed("answer_question", "missing answer")
                        })?;
                        counts.fields_resolved += 1;
                        match sourced.origin {
                            AnswerOrigin::Local => counts.local_answers += 1,
                            AnswerOrigin::Fallback => counts.fallback_answers += 1,
                        }
                        ExtractedNode::Field(sourced.answer)
                    }
                    NodeKind::Group(children) => {
                        let mut chain = Vec::with_capacity(group_base.len() + 1);
                        chain.push(node.name.as_str());
                        chain.extend(group_base.iter().copied());
                        let nested = self
                            .resolve_nodes(children, chain.clone(), chain, texts, &mut *counts)
                            .await?;
                        ExtractedNode::Group(nested)
                    }
                    NodeKind::List(list) => {
                        let question = list.question_for(&node.name);
                        let entries =
                            resolve_list(self.client, &question, &list.columns, texts.document)
                                .await?;
                        counts.list_entries += entries.len();
                        ExtractedNode::List(entries)
                    }
                };
                out.push((node.name.clone(), resolved));
            }
            Ok(out)
        }
        .boxed()
    }
}

/// The schema-shaped tree of a failed section: empty zero-confidence leaves
/// and empty lists.
pub fn placeholder_nodes(nodes: &[SchemaNode]) -> Vec<(String, ExtractedNode)> {
    nodes
        .iter()
        .map(|node| {
            let value = match &node.kind {
                NodeKind::Field => ExtractedNode::Field(FieldAnswer::placeholder()),
                NodeKind::Group(children) => ExtractedNode::Group(placeholder_nodes(children)),
                NodeKind::List(_) => ExtractedNode::List(Vec::new()),
            };
            (node.name.clone(), value)
        })
        .collect()
}
