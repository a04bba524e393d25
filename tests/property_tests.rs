//! Property-based tests using proptest

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use lexpipe_lib::pipeline::categorize::{categorize, Category};
use lexpipe_lib::pipeline::composite::{CompositeError, DocumentNode};
use lexpipe_lib::pipeline::message::{DocumentMessage, ProcessingStatus, Stage};
use lexpipe_lib::pipeline::validation::{
    ValidationChain, ValidationFailure, ValidationTarget, Validator,
};

struct Scripted {
    pass: bool,
    calls: Arc<AtomicUsize>,
}

impl Validator for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn validate(&self, _: &ValidationTarget<'_>) -> Result<(), ValidationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.pass {
            Ok(())
        } else {
            Err(ValidationFailure::new("scripted", "no"))
        }
    }
}

fn tree_from(groups: &[Vec<u64>]) -> DocumentNode {
    let mut root = DocumentNode::composite("root");
    for (g, sizes) in groups.iter().enumerate() {
        let mut group = DocumentNode::composite(format!("group-{g}"));
        for (i, size) in sizes.iter().enumerate() {
            group
                .add(DocumentNode::leaf(format!("doc-{g}-{i}"), *size, "pdf"))
                .unwrap();
        }
        root.add(group).unwrap();
    }
    root
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_composite_size_is_recursive_sum(
        groups in prop::collection::vec(prop::collection::vec(0u64..1_000_000, 0..6), 0..6)
    ) {
        let root = tree_from(&groups);
        let expected: u64 = groups.iter().flatten().sum();
        prop_assert_eq!(root.size(), expected);

        for (g, sizes) in groups.iter().enumerate() {
            let child = root.child(g).unwrap();
            prop_assert_eq!(child.size(), sizes.iter().sum::<u64>());
        }
    }

    #[test]
    fn test_removing_child_subtracts_its_size(
        sizes in prop::collection::vec(0u64..1_000_000, 1..10),
        pick in any::<prop::sample::Index>()
    ) {
        let mut root = DocumentNode::composite("root");
        for (i, size) in sizes.iter().enumerate() {
            root.add(DocumentNode::leaf(format!("doc-{i}"), *size, "txt")).unwrap();
        }
        let before = root.size();
        let victim = root.children()[pick.index(sizes.len())].clone();

        prop_assert!(root.remove(&victim).unwrap());
        prop_assert_eq!(root.size(), before - victim.size());
        prop_assert_eq!(root.children().len(), sizes.len() - 1);
    }

    #[test]
    fn test_leaf_never_accepts_children(name in "[a-z]{1,12}", size in any::<u64>()) {
        let mut leaf = DocumentNode::leaf(name, size, "docx");
        let other = DocumentNode::leaf("other", 1, "pdf");
        prop_assert_eq!(leaf.add(other.clone()), Err(CompositeError::LeafCannotHaveChildren));
        prop_assert_eq!(leaf.remove(&other), Err(CompositeError::LeafCannotHaveChildren));
        prop_assert!(leaf.children().is_empty());
        prop_assert_eq!(leaf.size(), size);
    }

    #[test]
    fn test_categorize_is_deterministic(text in ".{0,200}") {
        prop_assert_eq!(categorize(&text), categorize(&text));
    }

    #[test]
    fn test_contract_terms_win_over_later_rules(
        prefix in "[a-z ]{0,40}",
        suffix in "[a-z ]{0,40}",
        term in prop::sample::select(vec!["contract", "Agreement", "TERMS", "conditions"]),
        other in prop::sample::select(vec!["court", "lawsuit", "company", "shareholder", "board"])
    ) {
        let text = format!("{prefix} {other} {term} {suffix}");
        prop_assert_eq!(categorize(&text), Category::Contract);
    }

    #[test]
    fn test_whitespace_is_unknown(ws in "[ \t\r\n]{0,30}") {
        prop_assert_eq!(categorize(&ws), Category::Unknown);
    }

    #[test]
    fn test_chain_stops_at_first_failure(verdicts in prop::collection::vec(any::<bool>(), 0..8)) {
        let counters: Vec<Arc<AtomicUsize>> =
            verdicts.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let chain = verdicts.iter().zip(&counters).fold(ValidationChain::new(), |chain, (pass, calls)| {
            chain.with(Scripted { pass: *pass, calls: calls.clone() })
        });

        let target = ValidationTarget {
            document_id: "doc",
            path: Path::new("doc.txt"),
            document_type: "txt",
            content: None,
        };
        let result = chain.validate(&target);

        let first_failure = verdicts.iter().position(|pass| !pass);
        prop_assert_eq!(result.is_err(), first_failure.is_some());
        for (i, calls) in counters.iter().enumerate() {
            let expected = match first_failure {
                Some(f) if i > f => 0,
                _ => 1,
            };
            prop_assert_eq!(calls.load(Ordering::SeqCst), expected, "validator {}", i);
        }
    }

    #[test]
    fn test_terminal_states_are_final(ops in prop::collection::vec(0u8..5, 0..12)) {
        let mut message = DocumentMessage::new("doc", "doc.txt", "txt").unwrap();
        let mut terminal: Option<ProcessingStatus> = None;

        for op in ops {
            let _ = match op {
                0 => message.begin_processing(),
                1 => message.record_stage(Stage::Validation),
                2 => message.set_content("text".into()),
                3 => message.complete(Category::General),
                _ => message.fail(Stage::Extraction, "boom"),
            };
            match terminal {
                Some(status) => prop_assert_eq!(message.status(), status),
                None if message.status().is_terminal() => terminal = Some(message.status()),
                None => {}
            }
        }
    }
}
