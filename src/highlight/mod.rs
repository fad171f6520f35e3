use std::collections::BTreeSet;

use tracing::debug;

use crate::document::{Document, Role, RolePair, RowId, Span, SpanId};
use crate::view::{Mark, ViewState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoOutcome {
    /// The click landed outside any span of the pair; nothing changed.
    NoTarget,
    /// Every matching definition resolves to the same address set.
    Jump {
        origin: SpanId,
        target: Option<SpanId>,
    },
    /// Distinct candidate definitions; the view was sliced to compare them.
    Sliced {
        origin: SpanId,
        definitions: Vec<SpanId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutcome {
    NoTarget,
    Sliced {
        origin: SpanId,
        definitions: Vec<SpanId>,
        uses: Vec<SpanId>,
    },
}

/// Walks from `clicked` to the nearest span carrying either role of `pair`,
/// returning it only when it has at least one address.
pub fn resolve_origin<'a>(document: &'a Document, clicked: SpanId, pair: RolePair) -> Option<&'a Span> {
    document
        .nearest_with_any_role(clicked, &pair.roles())
        .filter(|span| span.is_addressable())
}

pub fn addresses_intersect(left: &[String], right: &[String]) -> bool {
    left.iter().any(|address| right.contains(address))
}

/// Unordered comparison with equal cardinality; lists of different length never match.
pub fn addresses_fully_equal(left: &[String], right: &[String]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left = left.iter().collect::<Vec<_>>();
    let mut right = right.iter().collect::<Vec<_>>();
    left.sort();
    right.sort();
    left == right
}

fn all_fully_equal(document: &Document, spans: &[SpanId]) -> bool {
    let Some((first, rest)) = spans.split_first() else {
        return true;
    };
    let reference = document.addresses_of(*first);
    rest.iter()
        .all(|span| addresses_fully_equal(reference, document.addresses_of(*span)))
}

fn rows_of(document: &Document, spans: impl IntoIterator<Item = SpanId>) -> BTreeSet<RowId> {
    spans
        .into_iter()
        .filter_map(|span| document.span(span).map(|span| span.row))
        .collect()
}

/// Document-wide view of every definition (`criterion`) and use (`dependency`) of a layer.
pub fn show_all_pairs(document: &Document, view: &mut ViewState, pair: RolePair) -> usize {
    view.erase();

    let mut marked = Vec::new();
    for span in document.spans_with_role(pair.definition) {
        view.mark(span.id, Mark::Criterion);
        marked.push(span.id);
    }
    for span in document.spans_with_role(pair.usage) {
        view.mark(span.id, Mark::Dependency);
        marked.push(span.id);
    }

    let rows = rows_of(document, marked.iter().copied());
    view.slice_to(rows);
    debug!(
        definition = pair.definition.class_name(),
        marked = marked.len(),
        placeholders = view.placeholders().len(),
        "show-all-pairs applied"
    );
    marked.len()
}

pub fn goto_definition(
    document: &Document,
    view: &mut ViewState,
    clicked: SpanId,
    pair: RolePair,
) -> GotoOutcome {
    let Some(origin) = resolve_origin(document, clicked, pair) else {
        return GotoOutcome::NoTarget;
    };

    view.erase();
    view.unslice();
    view.mark(origin.id, Mark::Use);

    let definitions = document
        .spans_with_role(pair.definition)
        .filter(|span| addresses_intersect(&span.addresses, &origin.addresses))
        .map(|span| span.id)
        .collect::<Vec<_>>();
    for definition in &definitions {
        view.unmark(*definition, Mark::Use);
        view.mark(*definition, Mark::Definition);
    }

    if all_fully_equal(document, &definitions) {
        debug!(origin = origin.id.0, matches = definitions.len(), "goto-definition resolved");
        return GotoOutcome::Jump {
            origin: origin.id,
            target: definitions.first().copied(),
        };
    }

    let mut rows = rows_of(document, definitions.iter().copied());
    rows.insert(origin.row);
    view.slice_to(rows);
    debug!(
        origin = origin.id.0,
        matches = definitions.len(),
        "goto-definition ambiguous; sliced to candidates"
    );
    GotoOutcome::Sliced {
        origin: origin.id,
        definitions,
    }
}

pub fn find_uses(
    document: &Document,
    view: &mut ViewState,
    clicked: SpanId,
    pair: RolePair,
) -> FindOutcome {
    let Some(origin) = resolve_origin(document, clicked, pair) else {
        return FindOutcome::NoTarget;
    };

    view.erase();
    let (definitions, uses) = mark_links(document, view, &origin.addresses, pair);

    let mut rows = rows_of(document, definitions.iter().chain(uses.iter()).copied());
    rows.insert(origin.row);
    view.slice_to(rows);
    debug!(
        origin = origin.id.0,
        definitions = definitions.len(),
        uses = uses.len(),
        "find-uses sliced"
    );
    FindOutcome::Sliced {
        origin: origin.id,
        definitions,
        uses,
    }
}

/// Click highlighting: marks linked definitions and uses without touching visibility.
pub fn highlight_links(
    document: &Document,
    view: &mut ViewState,
    clicked: SpanId,
    pair: RolePair,
) -> Option<usize> {
    let origin = resolve_origin(document, clicked, pair)?;
    view.erase();
    let (definitions, uses) = mark_links(document, view, &origin.addresses, pair);
    Some(definitions.len() + uses.len())
}

fn mark_links(
    document: &Document,
    view: &mut ViewState,
    addresses: &[String],
    pair: RolePair,
) -> (Vec<SpanId>, Vec<SpanId>) {
    let mut sweep = |role: Role, mark: Mark| {
        let matched = document
            .spans_with_role(role)
            .filter(|span| addresses_intersect(&span.addresses, addresses))
            .map(|span| span.id)
            .collect::<Vec<_>>();
        for span in &matched {
            view.mark(*span, mark);
        }
        matched
    };
    let definitions = sweep(pair.definition, Mark::Definition);
    let uses = sweep(pair.usage, Mark::Use);
    (definitions, uses)
}

/// Default view: every inserted or deleted row with its context.
pub fn line_diff_slice(document: &Document, view: &mut ViewState) -> usize {
    view.erase();
    let changed = document.changed_rows().collect::<Vec<_>>();
    view.slice_to(changed.iter().copied());
    changed.len()
}

#[cfg(test)]
mod tests {
    use super::{
        FindOutcome, GotoOutcome, addresses_fully_equal, find_uses, goto_definition,
        highlight_links, line_diff_slice, show_all_pairs,
    };
    use crate::document::{DiffStatus, Document, DocumentBuilder, Layer, LinkedLayer, SpanId};
    use crate::view::{Mark, ViewState};

    #[test]
    fn fully_equal_ignores_order_but_not_cardinality() {
        let set = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
        assert!(addresses_fully_equal(&set(&["a", "b"]), &set(&["b", "a"])));
        assert!(!addresses_fully_equal(&set(&["a"]), &set(&["a", "b"])));
        assert!(!addresses_fully_equal(&set(&["a", "a"]), &set(&["a", "b"])));
        assert!(addresses_fully_equal(&set(&[]), &set(&[])));
    }

    #[test]
    fn line_diff_overlapping_context_leaves_everything_visible() {
        let document = numbered_document(10, &[2, 7]);
        let mut view = ViewState::new(&document);

        line_diff_slice(&document, &mut view);

        assert_eq!(view.visible_rows().count(), 10);
        assert!(view.placeholders().is_empty());
    }

    #[test]
    fn line_diff_single_change_yields_two_placeholders() {
        let document = numbered_document(20, &[9]);
        let mut view = ViewState::new(&document);

        line_diff_slice(&document, &mut view);

        let visible = view.visible_rows().map(|row| row.0 + 1).collect::<Vec<_>>();
        assert_eq!(visible, vec![8, 9, 10, 11, 12]);
        assert_eq!(view.placeholders().len(), 2);
    }

    #[test]
    fn show_all_pairs_marks_layer_and_reveals_only_marked_rows() {
        let mut builder = DocumentBuilder::new();
        for index in 0..12 {
            builder.line(DiffStatus::Unchanged, |line| match index {
                0 => {
                    line.span("VAL-DEF", "v1", "a");
                }
                11 => {
                    line.span("VAL-USE", "v1", "b");
                }
                _ => {
                    line.span("ENV-DEF", "e1", "c");
                }
            });
        }
        let document = builder.build();
        let mut view = ViewState::new(&document);

        let marked = show_all_pairs(&document, &mut view, Layer::Value.role_pair());

        assert_eq!(marked, 2);
        assert_eq!(view.spans_marked(Mark::Criterion), vec![SpanId(0)]);
        assert_eq!(view.spans_marked(Mark::Dependency), vec![SpanId(11)]);
        let visible = view.visible_rows().map(|row| row.0).collect::<Vec<_>>();
        assert_eq!(visible, vec![0, 1, 2, 9, 10, 11]);
        assert_eq!(view.placeholders().len(), 1);
    }

    #[test]
    fn show_all_pairs_over_absent_layer_highlights_nothing() {
        let document = numbered_document(5, &[1]);
        let mut view = ViewState::new(&document);

        let marked = show_all_pairs(&document, &mut view, Layer::DataDependency.role_pair());

        assert_eq!(marked, 0);
        assert_eq!(view.visible_rows().count(), 0);
        assert_eq!(view.placeholders().len(), 1);
    }

    #[test]
    fn goto_with_partially_overlapping_definitions_slices() {
        let (document, use_span) = ambiguous_document();
        let mut view = ViewState::new(&document);

        let outcome = goto_definition(
            &document,
            &mut view,
            use_span,
            LinkedLayer::Variable.role_pair(),
        );

        let GotoOutcome::Sliced { origin, definitions } = outcome else {
            panic!("expected an ambiguous slice, got {outcome:?}");
        };
        assert_eq!(origin, use_span);
        assert_eq!(definitions, vec![SpanId(0), SpanId(1)]);
        assert!(view.marks(use_span).contains(Mark::Use));
        assert!(view.marks(SpanId(0)).contains(Mark::Definition));
        let visible = view.visible_rows().map(|row| row.0).collect::<Vec<_>>();
        assert_eq!(visible, vec![0, 1, 2, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14]);
        assert_eq!(view.placeholders().len(), 3);
    }

    #[test]
    fn goto_with_identical_definitions_jumps_without_slicing() {
        let mut builder = DocumentBuilder::new();
        builder.line(DiffStatus::Unchanged, |line| {
            line.span("DENV-DEF", "a2,a1", "var x");
        });
        for _ in 0..8 {
            builder.line(DiffStatus::Unchanged, |line| {
                line.text("...");
            });
        }
        let mut use_span = SpanId(0);
        builder.line(DiffStatus::Inserted, |line| {
            use_span = line.span("DENV-USE", "a1,a2", "x");
        });
        let document = builder.build();
        let mut view = ViewState::new(&document);
        view.slice_to([document.rows()[9].id]);

        let outcome = goto_definition(
            &document,
            &mut view,
            use_span,
            LinkedLayer::Variable.role_pair(),
        );

        assert_eq!(
            outcome,
            GotoOutcome::Jump {
                origin: use_span,
                target: Some(SpanId(0)),
            }
        );
        assert!(view.placeholders().is_empty());
        assert_eq!(view.visible_rows().count(), document.row_count());
        assert!(view.marks(SpanId(0)).contains(Mark::Definition));
    }

    #[test]
    fn goto_with_subset_and_superset_definitions_slices() {
        let mut builder = DocumentBuilder::new();
        let narrow = builder.line(DiffStatus::Unchanged, |line| {
            line.span("DENV-DEF", "a1", "var x");
        });
        for _ in 0..10 {
            builder.line(DiffStatus::Unchanged, |line| {
                line.text("...");
            });
        }
        let wide = builder.line(DiffStatus::Unchanged, |line| {
            line.span("DENV-DEF", "a1,a2", "var y");
        });
        for _ in 0..10 {
            builder.line(DiffStatus::Unchanged, |line| {
                line.text("...");
            });
        }
        let mut use_span = SpanId(0);
        let use_row = builder.line(DiffStatus::Unchanged, |line| {
            use_span = line.span("DENV-USE", "a1", "x");
        });
        let document = builder.build();
        let mut view = ViewState::new(&document);

        let outcome = goto_definition(
            &document,
            &mut view,
            use_span,
            LinkedLayer::Variable.role_pair(),
        );

        assert_eq!(
            outcome,
            GotoOutcome::Sliced {
                origin: use_span,
                definitions: vec![SpanId(0), SpanId(1)],
            }
        );
        for row in [narrow, wide, use_row] {
            assert!(view.is_visible(row));
        }
        assert!(!view.is_visible(document.rows()[6].id));
        assert!(!view.placeholders().is_empty());
    }

    #[test]
    fn goto_from_a_definition_clears_its_use_mark() {
        let mut builder = DocumentBuilder::new();
        let mut definition = SpanId(0);
        builder.line(DiffStatus::Unchanged, |line| {
            definition = line.span("DVAL-DEF", "v1", "f");
        });
        let document = builder.build();
        let mut view = ViewState::new(&document);

        let outcome = goto_definition(&document, &mut view, definition, LinkedLayer::Value.role_pair());

        assert!(matches!(outcome, GotoOutcome::Jump { .. }));
        let marks = view.marks(definition);
        assert!(marks.contains(Mark::Definition));
        assert!(!marks.contains(Mark::Use));
    }

    #[test]
    fn goto_outside_any_linked_span_is_a_no_op() {
        let mut builder = DocumentBuilder::new();
        let mut plain = SpanId(0);
        let mut empty = SpanId(0);
        builder.line(DiffStatus::Inserted, |line| {
            plain = line.span("CALL-USE", "c1", "go()");
            empty = line.span("DENV-USE", "", "y");
        });
        let document = builder.build();
        let mut view = ViewState::new(&document);
        line_diff_slice(&document, &mut view);
        let before = view.clone();

        let pair = LinkedLayer::Variable.role_pair();
        assert_eq!(goto_definition(&document, &mut view, plain, pair), GotoOutcome::NoTarget);
        assert_eq!(goto_definition(&document, &mut view, empty, pair), GotoOutcome::NoTarget);
        assert_eq!(find_uses(&document, &mut view, plain, pair), FindOutcome::NoTarget);
        assert_eq!(highlight_links(&document, &mut view, plain, pair), None);
        assert_eq!(view, before);
    }

    #[test]
    fn find_uses_slices_even_for_a_single_match() {
        let mut builder = DocumentBuilder::new();
        let mut definition = SpanId(0);
        builder.line(DiffStatus::Unchanged, |line| {
            definition = line.span("DENV-DEF", "a1", "let a");
        });
        for _ in 0..10 {
            builder.line(DiffStatus::Unchanged, |line| {
                line.text("...");
            });
        }
        let document = builder.build();
        let mut view = ViewState::new(&document);

        let outcome = find_uses(&document, &mut view, definition, LinkedLayer::Variable.role_pair());

        assert_eq!(
            outcome,
            FindOutcome::Sliced {
                origin: definition,
                definitions: vec![definition],
                uses: Vec::new(),
            }
        );
        assert_eq!(view.visible_rows().count(), 3);
        assert_eq!(view.placeholders().len(), 1);
    }

    #[test]
    fn find_uses_sweeps_definitions_and_uses_by_intersection() {
        let (document, use_span) = ambiguous_document();
        let mut view = ViewState::new(&document);

        let FindOutcome::Sliced { definitions, uses, .. } =
            find_uses(&document, &mut view, use_span, LinkedLayer::Variable.role_pair())
        else {
            panic!("find-uses should slice");
        };

        assert_eq!(definitions, vec![SpanId(0), SpanId(1)]);
        assert_eq!(uses, vec![use_span]);
        assert!(view.marks(use_span).contains(Mark::Use));
    }

    #[test]
    fn highlight_links_keeps_visibility() {
        let (document, use_span) = ambiguous_document();
        let mut view = ViewState::new(&document);
        line_diff_slice(&document, &mut view);
        let visible_before = view.visible_rows().collect::<Vec<_>>();

        let marked = highlight_links(&document, &mut view, use_span, LinkedLayer::Variable.role_pair());

        assert_eq!(marked, Some(3));
        assert_eq!(view.visible_rows().collect::<Vec<_>>(), visible_before);
        assert_eq!(view.spans_marked(Mark::Definition).len(), 2);
    }

    /// Definitions `a1` (row 0) and `a2` (row 6); a use `a1,a2` on row 12 of 30.
    fn ambiguous_document() -> (Document, SpanId) {
        let mut builder = DocumentBuilder::new();
        let mut use_span = SpanId(0);
        for index in 0..30 {
            builder.line(DiffStatus::Unchanged, |line| match index {
                0 => {
                    line.span("DENV-DEF", "a1", "var a");
                }
                6 => {
                    line.span("DENV-DEF", "a2", "var a");
                }
                12 => {
                    use_span = line.span("DENV-USE", "a1,a2", "a");
                }
                _ => {
                    line.text("...");
                }
            });
        }
        (builder.build(), use_span)
    }

    fn numbered_document(rows: usize, inserted: &[usize]) -> Document {
        let mut builder = DocumentBuilder::new();
        for index in 0..rows {
            let status = if inserted.contains(&index) {
                DiffStatus::Inserted
            } else {
                DiffStatus::Unchanged
            };
            builder.line(status, |line| {
                line.text(&format!("R{}", index + 1));
            });
        }
        builder.build()
    }
}
