use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use llm_mutator::Language;
use llm_mutator::config::Config;
use llm_mutator::discover::{discover_specs, load_package, select_files};
use tempfile::TempDir;

fn found(path: &str, source: &str, language: Language, max_lines: usize) -> Vec<(String, String)> {
    discover_specs(&Utf8PathBuf::from(path), source, language, max_lines)
        .into_iter()
        .map(|s| (s.orig, s.feature))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(o, f)| (o.to_string(), f.to_string()))
        .collect()
}

#[test]
fn javascript_conditions_callees_receivers_and_arguments() {
    let source = r#"function check(a, b) {
  if (a > b) {
    return log.warn(a);
  }
  while (a < 10) a++;
  return 0;
}
"#;
    assert_eq!(
        found("src/check.js", source, Language::JavaScript, 1),
        pairs(&[
            ("a > b", "if condition"),
            ("log", "call receiver"),
            ("log.warn", "callee"),
            ("(a)", "call arguments"),
            ("a < 10", "while condition"),
        ])
    );
}

#[test]
fn locations_point_at_the_fragment() {
    let source = "function check(a, b) {\n  if (a > b) {\n    return 1;\n  }\n}\n";
    let specs = discover_specs(&Utf8PathBuf::from("src/check.js"), source, Language::JavaScript, 1);
    let loc = &specs[0].location;
    assert_eq!(loc.file, "src/check.js");
    assert_eq!((loc.line_nr, loc.start_line, loc.start_column), (2, 2, 6));
    assert_eq!((loc.end_line, loc.end_column), (2, 11));
}

#[test]
fn typescript_calls() {
    let source = "const n: number = parse(s, 10);\n";
    assert_eq!(
        found("src/n.ts", source, Language::TypeScript, 1),
        pairs(&[("parse", "callee"), ("(s, 10)", "call arguments")])
    );
}

#[test]
fn python_conditions_and_method_calls() {
    let source = "def f(xs):\n    if len(xs) > 0:\n        return xs.pop()\n    return None\n";
    assert_eq!(
        found("f.py", source, Language::Python, 1),
        pairs(&[
            ("len", "callee"),
            ("len(xs) > 0", "if condition"),
            ("(xs)", "call arguments"),
            ("xs", "call receiver"),
            ("xs.pop", "callee"),
            ("()", "call arguments"),
        ])
    );
}

#[test]
fn rust_method_call_in_condition() {
    let source = "fn f(v: &[i32]) -> usize {\n    if v.is_empty() { return 0; }\n    compute(v)\n}\n";
    let specs = found("src/f.rs", source, Language::Rust, 1);
    assert!(specs.contains(&("v.is_empty()".into(), "if condition".into())));
    assert!(specs.contains(&("v".into(), "call receiver".into())));
    assert!(specs.contains(&("compute".into(), "callee".into())));
    assert!(specs.contains(&("(v)".into(), "call arguments".into())));
}

#[test]
fn spans_longer_than_max_lines_are_left_out() {
    let source = "if (a &&\n    b) {\n  x = 1;\n}\n";
    assert!(found("a.js", source, Language::JavaScript, 1).is_empty());
    assert_eq!(
        found("a.js", source, Language::JavaScript, 2),
        pairs(&[("a &&\n    b", "if condition")])
    );
}

#[test]
fn unparsable_file_has_no_specs() {
    assert!(found("a.js", "if (a > ) { foo(;\n", Language::JavaScript, 1).is_empty());
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

#[test]
fn select_files_honors_mutate_ignore_and_skip_dirs() {
    let dir = TempDir::new().unwrap();
    for rel in [
        "index.js",
        "src/a.js",
        "src/b.ts",
        "src/c.py",
        "src/gen/d.js",
        "node_modules/x/index.js",
        "MUTATION_TESTING/old.js",
    ] {
        write(dir.path(), rel, "f(1);\n");
    }
    let config = Config {
        ignore: "src/gen/**".into(),
        ..Config::default()
    };

    let files = select_files(dir.path(), &config).unwrap();

    assert_eq!(
        files,
        vec![
            PathBuf::from("index.js"),
            PathBuf::from("src/a.js"),
            PathBuf::from("src/b.ts"),
        ]
    );
}

#[test]
fn load_package_reads_and_scans_selected_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "lib/app.py", "if ready:\n    go(1)\n");
    write(dir.path(), "lib/app.js", "go(1);\n");
    let config = Config {
        mutate: "lib/*.py".into(),
        ..Config::default()
    };

    let files = load_package(dir.path(), &config).unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "lib/app.py");
    assert_eq!(files[0].language, Language::Python);
    assert!(files[0].text.starts_with("if ready:"));
    let origs: Vec<&str> = files[0].specs.iter().map(|s| s.orig.as_str()).collect();
    assert_eq!(origs, vec!["ready", "go", "(1)"]);
}

#[test]
fn missing_package_dir_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(select_files(&dir.path().join("nope"), &Config::default()).is_err());
}
