use console::Style;
use std::path::Path;

use crate::location;
use crate::mutants::Mutant;
use crate::state::RunSummary;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_summary(summary: &RunSummary, dir: &Path) {
    let style = if summary.nr_mutants > 0 {
        Style::new().green().bold()
    } else {
        Style::new().yellow().bold()
    };
    let meta = &summary.meta_info;
    println!(
        "{} {}: {} mutants from {} prompts ({}, temperature {:.1})",
        style.apply_to("✓"),
        dir.display(),
        summary.nr_mutants,
        summary.nr_prompts,
        meta.model_name,
        meta.temperature,
    );

    let dim = Style::new().dim();
    println!(
        "  {} candidates: {} total, {} invalid, {} identical, {} duplicate",
        dim.apply_to("·"),
        summary.nr_candidates,
        summary.nr_syntactically_invalid,
        summary.nr_identical,
        summary.nr_duplicate,
    );
    println!(
        "  {} tokens: {} prompt, {} completion, {} total",
        dim.apply_to("·"),
        summary.total_prompt_tokens,
        summary.total_completion_tokens,
        summary.total_tokens,
    );
    if summary.nr_skipped > 0 {
        println!("  {} {} locations skipped by filters", dim.apply_to("·"), summary.nr_skipped);
    }
    if summary.nr_query_failed > 0 || summary.nr_retries > 0 {
        let warn = Style::new().yellow();
        println!(
            "  {} {} prompts failed ({} retries)",
            warn.apply_to("!"),
            summary.nr_query_failed,
            summary.nr_retries,
        );
    }
    if summary.nr_replay_missing > 0 {
        let warn = Style::new().yellow();
        println!(
            "  {} {} prompts had no recorded response",
            warn.apply_to("!"),
            summary.nr_replay_missing,
        );
    }
}

/// Show each mutant as a line diff against the file under `root`.
pub fn print_mutants(mutants: &[Mutant], root: &Path) {
    let ref_style = Style::new().cyan().bold();
    for (i, m) in mutants.iter().enumerate() {
        println!(
            "{} {}:{} {} → {}",
            ref_style.apply_to(format!("@m{}", i + 1)),
            m.file,
            m.line_nr,
            Style::new().magenta().apply_to(&m.original_code),
            Style::new().magenta().apply_to(&m.replacement),
        );
        let Ok(source) = std::fs::read_to_string(root.join(&m.file)) else {
            continue;
        };
        let Some(mutated) = location::splice(&source, &m.location(), &m.replacement) else {
            continue;
        };
        for line in generate_diff(&source, &mutated).lines() {
            if line.starts_with('-') {
                println!("  {}", Style::new().red().apply_to(line));
            } else if line.starts_with('+') {
                println!("  {}", Style::new().green().apply_to(line));
            }
        }
    }
}

pub fn generate_diff(original: &str, mutated: &str) -> String {
    use similar::TextDiff;
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                output.push_str(&format!("- {}", change));
            }
            similar::ChangeTag::Insert => {
                output.push_str(&format!("+ {}", change));
            }
            _ => {}
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_shows_changed_line_only() {
        let diff = generate_diff("a\nif (x > 0) {}\nb\n", "a\nif (x >= 0) {}\nb\n");
        assert_eq!(diff, "- if (x > 0) {}\n+ if (x >= 0) {}\n");
    }
}
