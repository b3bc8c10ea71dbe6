//! End-to-end runs of the generation pipeline.

use promptloom::prelude::*;
use promptloom::validate::merged_band;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn request(fragments: &[&str]) -> PromptRequest {
    PromptRequest {
        inspiration: fragments.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn seeded(seed: u64) -> Pipeline {
    Pipeline::new(PipelineConfig::default().with_seed(seed))
}

// ── Scenarios ──────────────────────────────────────────────────────

#[test]
fn fragments_and_must_include_survive_population() {
    let mut request = request(&[
        "prefer short answers",
        "ask before making assumptions",
        "cite the section you relied on",
    ]);
    request.must_include = Some("Always confirm before deleting files.".into());

    for seed in 0..20 {
        let report = seeded(seed).run(&request, None).unwrap();
        let doc = &report.document;
        assert!(doc.contains("Always confirm before deleting files."), "seed {seed}");
        assert!(doc.ends_with("Always confirm before deleting files."), "seed {seed}");
        assert!(!doc.contains('['), "seed {seed}: {doc}");
        assert!(!doc.contains('#'), "seed {seed}: {doc}");
        assert!(doc.contains("Prefer short answers."));
        assert!(doc.contains("Ask before making assumptions."));
        assert!(doc.contains("Cite the section you relied on."));
    }
}

#[test]
fn six_paragraphs_six_fragments_each_used_once() {
    let fragments = [
        "Use SI units.",
        "Quote error messages exactly.",
        "Keep code samples short.",
        "Offer a summary at the end.",
        "Name the file you are editing.",
        "Flag anything irreversible.",
    ];
    let pipeline = Pipeline::new(PipelineConfig::default().with_exact_paragraphs(6).with_seed(11));
    let report = pipeline.run(&request(&fragments), None).unwrap();

    assert_eq!(report.structure.len(), 6);
    assert_eq!(report.document.split("\n\n").count(), 6);
    for fragment in fragments {
        assert_eq!(report.document.matches(fragment).count(), 1, "{fragment}");
    }
    let spans: Vec<&str> = report.structure.verbatim_spans().map(|s| s.text.as_str()).collect();
    assert_eq!(spans.len(), 6);
    let pure = report
        .structure
        .paragraphs
        .iter()
        .filter(|p| p.is_pure_reference())
        .count();
    assert!(pure >= 2);
}

#[test]
fn five_paragraph_structure_cannot_be_annotated() {
    let markup = "\
[CONTEXT_INFORMATION] (a) [TONAL_CONTROL] (b)

[USER_PREFERENCES] (c) [BACKGROUND_INFORMATION] (d)

[TOOL_USE_INSTRUCTIONS] (e) [TONAL_CONTROL] (f)

[CONTEXT_INFORMATION] [USER_PREFERENCES]

[TONAL_CONTROL] [BACKGROUND_INFORMATION]";
    let catalog = BlockCatalog::standard();
    let structure = parse_markup(markup, catalog).unwrap();
    assert_eq!(structure.len(), 5);

    let violations = validate_structure(&structure, catalog);
    assert!(violations.iter().any(|v| v.constraint == Constraint::ParagraphCount));

    let err = Annotator::new(catalog, &CatalogExplainer)
        .annotate(structure, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, Error::CoverageUnsatisfiable(_)), "{err}");
}

// ── Properties over seeds ──────────────────────────────────────────

#[test]
fn generated_structures_hold_every_invariant() {
    let catalog = BlockCatalog::standard();
    let request = request(&["mention the deadline", "avoid jargon"]);
    for seed in 0..60 {
        let report = seeded(seed).run(&request, None).unwrap();
        let structure = &report.structure;

        assert!(validate_structure(structure, catalog).is_empty(), "seed {seed}");
        assert!((6..=8).contains(&structure.len()));
        for block in ComplexBlock::ALL {
            assert_eq!(structure.count_complex(block), 1, "seed {seed}: {block}");
        }
        for block in SimpleBlock::ALL {
            assert!(structure.count_simple(block) >= 1, "seed {seed}: {block}");
        }
        let (low, high) = merged_band(ComplexBlock::ALL.len());
        assert!((low..=high).contains(&structure.merged_count()), "seed {seed}");

        // The markup is a faithful serialisation.
        assert_eq!(&parse_markup(&report.markup, catalog).unwrap(), structure, "seed {seed}");

        let report_again = seeded(seed).run(&request, None).unwrap();
        assert_eq!(report.document, report_again.document);
    }
}

fn tool_explainer() -> impl Explainer + 'static {
    FnExplainer::new(|block, _: &ExplainContext<'_>| match block {
        BlockRef::Simple(SimpleBlock::ToolUseInstructions) => {
            "Reach for file_search or the Shell_Exec runner.".to_string()
        }
        _ => "Keep answers grounded in file_search results.".to_string(),
    })
}

#[test]
fn tool_names_never_reach_the_document() {
    let request = PromptRequest {
        tool_names: vec!["file_search".into(), "shell_exec".into()],
        ..Default::default()
    };
    for seed in 0..15 {
        let report = seeded(seed)
            .with_explainer(tool_explainer())
            .run(&request, None)
            .unwrap();
        let lower = report.document.to_lowercase();
        assert!(!lower.contains("file_search"), "seed {seed}");
        assert!(!lower.contains("shell_exec"), "seed {seed}");
        assert!(report.document.contains("a suitable tool"), "seed {seed}");
    }
}

#[test]
fn verbatim_text_naming_a_tool_is_rejected_up_front() {
    let request = PromptRequest {
        inspiration: vec!["run file_search first".into()],
        tool_names: vec!["file_search".into()],
        ..Default::default()
    };
    let err = seeded(1).run(&request, None).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[test]
fn persona_is_mentioned_at_most_once() {
    let request = PromptRequest {
        persona: Some("Jordan".into()),
        ..Default::default()
    };
    for seed in 0..10 {
        let report = seeded(seed)
            .with_explainer(FnExplainer::new(|_, _: &ExplainContext<'_>| {
                "Jordan wants brevity, so answer Jordan directly.".to_string()
            }))
            .run(&request, None)
            .unwrap();
        assert_eq!(report.document.matches("Jordan").count(), 1, "seed {seed}");
        assert!(report.document.starts_with("You are assisting Jordan."));
        assert!(report.document.contains("The user wants brevity, so answer the user directly."));
    }
}

#[test]
fn user_contexts_drive_persona_and_background() {
    let contexts: Vec<serde_json::Value> = ["Ana", "Ben", "Chloe", "Dev", "Eli"]
        .iter()
        .map(|name| {
            serde_json::json!({
                "user_name": name,
                "user_role": "student",
                "user_personality": "impatient",
                "what_they_are_doing_for_current_task": format!("revising notes for {name}'s exam"),
                "conversation_flow": []
            })
        })
        .collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contexts.json");
    std::fs::write(&path, serde_json::json!({ "contexts": contexts }).to_string()).unwrap();

    let set = UserContextSet::load(&path).unwrap();
    let user = set.get(2).unwrap();
    let report = seeded(3).run(&PromptRequest::default(), Some(user)).unwrap();
    assert_eq!(report.persona.as_deref(), Some("Chloe"));
    assert!(report.document.starts_with("You are assisting Chloe."));
    assert_eq!(report.document.matches("Chloe").count(), 1);
}

#[test]
fn request_file_round_trip_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("request.json");
    std::fs::write(
        &path,
        r#"{
            "inspiration": ["state assumptions explicitly"],
            "must_include": "Never share credentials.",
            "system_settings": ["the user is on a phone", "responses are read aloud"]
        }"#,
    )
    .unwrap();
    let request = PromptRequest::load(&path).unwrap();
    let report = seeded(17).run(&request, None).unwrap();
    assert!(report.document.ends_with("Never share credentials."));
    assert!(report.document.contains("Take into account that the user is on a phone."));
    assert!(report.document.contains("Take into account that responses are read aloud."));
}
