// tests/query_test.rs - Completion, hover, signature help and definition over a scanned project

mod common;

use common::project::{MAIN, lua_project, util_project};
use lsp_types::{CompletionItemKind, HoverContents, Position};
use quill::index::Index;
use quill::query::{self, Documents};

fn scanned(dir: &tempfile::TempDir) -> Index {
    let mut index = Index::new().unwrap();
    index.scan(dir.path()).unwrap();
    index
}

#[test]
fn test_completion_after_receiver() {
    let dir = util_project();
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("main.lua"));
    let items = query::complete(&index, &label, "util.a", Position::new(0, 6));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label, "add");
    assert_eq!(items[0].kind, Some(CompletionItemKind::FUNCTION));
    assert_eq!(items[0].detail.as_deref(), Some("util.add(a, b)"));
}

#[test]
fn test_string_receiver_completion() {
    let dir = util_project();
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("main.lua"));
    let text = "local s = \"text\"\ns:";
    let labels: Vec<_> = query::complete(&index, &label, text, Position::new(1, 2))
        .into_iter()
        .map(|item| item.label)
        .collect();
    assert!(labels.contains(&"upper".to_string()));
    assert!(labels.contains(&"format".to_string()));
    assert!(!labels.contains(&"add".to_string()));
    assert!(!labels.contains(&"insert".to_string()));
}

#[test]
fn test_locals_only_complete_in_their_file() {
    let dir = lua_project(&[
        ("a.lua", "local function helper(x) end\n"),
        ("b.lua", "function hello() end\n"),
    ]);
    let index = scanned(&dir);
    let in_a = index.label_for(&dir.path().join("a.lua"));
    let in_b = index.label_for(&dir.path().join("b.lua"));

    let names = |label: &str| -> Vec<String> {
        query::complete(&index, label, "hel", Position::new(0, 3))
            .into_iter()
            .map(|item| item.label)
            .collect()
    };
    assert_eq!(names(&in_a), vec!["helper", "hello"]);
    assert_eq!(names(&in_b), vec!["hello"]);
}

#[test]
fn test_hover_prefers_confirmed_match() {
    let dir = lua_project(&[
        ("util.lua", "--- Adds numbers.\nfunction util.add(a, b) end\n"),
        ("vec.lua", "--- Adds vectors.\nfunction vec.add(a, b) end\n"),
    ]);
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("main.lua"));
    let hover = query::hover(&index, &label, "util.add(1, 2)", Position::new(0, 6)).unwrap();
    match hover.contents {
        HoverContents::Markup(markup) => {
            assert_eq!(markup.value, "util.add(a, b)\nAdds numbers.")
        }
        other => panic!("unexpected hover {:?}", other),
    }
}

#[test]
fn test_signature_help_skips_nested_call() {
    let dir = lua_project(&[("m.lua", "function foo(a, b, c) end\nfunction bar(x, y) end\n")]);
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("m.lua"));
    let text = "foo(1, bar(2,3), )";
    let help = query::signature_help(&index, &label, text, Position::new(0, 17)).unwrap();
    assert_eq!(help.signatures.len(), 1);
    assert_eq!(help.signatures[0].label, "foo(a, b, c)");
    assert_eq!(help.active_parameter, Some(2));
}

#[test]
fn test_definition_refinds_locator_after_blank_lines() {
    let dir = util_project();
    let index = scanned(&dir);
    let util = dir.path().join("util.lua");
    let main = dir.path().join("main.lua");
    let label = index.label_for(&main);

    let before = query::definition(&index, &Documents::new(), &label, MAIN, Position::new(0, 20));
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].range.start.line, 4);

    let mut documents = Documents::new();
    let shifted = format!("\n\n\n\n\n{}", common::project::UTIL);
    documents.update(&util, shifted);
    let after = query::definition(&index, &documents, &label, MAIN, Position::new(0, 20));
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].range.start.line, 9);
    assert_eq!(after[0].uri.to_file_path().unwrap(), util.canonicalize().unwrap());
}

#[test]
fn test_definition_of_unknown_name_is_empty() {
    let dir = util_project();
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("main.lua"));
    assert!(query::definition(&index, &Documents::new(), &label, "nothing()", Position::new(0, 2)).is_empty());
}

#[test]
fn test_definition_of_builtin_opens_declarations() {
    let dir = util_project();
    let index = scanned(&dir);
    let label = index.label_for(&dir.path().join("main.lua"));
    let found = query::definition(&index, &Documents::new(), &label, MAIN, Position::new(2, 1));
    assert_eq!(found.len(), 1);
    let path = found[0].uri.to_file_path().unwrap();
    assert!(path.starts_with(index.stdlib_dir()));
}

#[test]
fn test_receiver_type_outranks_scope_and_name() {
    let dir = lua_project(&[
        ("a.lua", "local function upper(x) end\nfunction text.upper(t) end\n"),
        ("b.lua", "function other() end\n"),
    ]);
    let index = scanned(&dir);
    let text = "local function upper(x) end\nfunction text.upper(t) end\nlocal s = \"x\"\ns:up";

    for file in ["a.lua", "b.lua"] {
        let label = index.label_for(&dir.path().join(file));
        let items = query::complete(&index, &label, text, Position::new(3, 4));
        assert_eq!(items.len(), 1, "in {}", file);
        assert_eq!(items[0].label, "upper");
        assert_eq!(items[0].detail.as_deref(), Some("string.upper(s)"));
        assert_eq!(items[0].kind, Some(CompletionItemKind::METHOD));
    }
}
