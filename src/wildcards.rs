//! The wildcard engine: pattern tokenization, anchored matching with
//! capture groups, replacement weaving and filesystem globbing.
//!
//! A pattern is a sequence of literal chunks and `*` wildcards. Literal
//! chunks are position-locked; each wildcard greedily captures up to the
//! next literal chunk (its anchor), and a final wildcard captures the
//! remaining suffix.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// One component of a tokenized pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Text(String),
    Wildcard,
}

/// Two consecutive wildcards cannot be matched meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pattern contains adjacent wildcards")]
pub struct AdjacentWildcards;

/// Failures of [`compute_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplaceError {
    #[error(transparent)]
    AdjacentWildcards(#[from] AdjacentWildcards),
    #[error("product has more wildcards than filter")]
    ChunksLength,
}

/// Split a pattern at its `*` markers.
pub fn tokenize(pattern: &str) -> Vec<Component> {
    let mut components = Vec::new();
    let mut chunk = String::new();
    for c in pattern.chars() {
        if c == '*' {
            if !chunk.is_empty() {
                components.push(Component::Text(std::mem::take(&mut chunk)));
            }
            components.push(Component::Wildcard);
        } else {
            chunk.push(c);
        }
    }
    if !chunk.is_empty() {
        components.push(Component::Text(chunk));
    }
    components
}

/// Reject adjacent wildcards before any matching loop runs.
fn verify_components(components: &[Component]) -> Result<(), AdjacentWildcards> {
    let adjacent = components
        .windows(2)
        .any(|pair| pair[0] == Component::Wildcard && pair[1] == Component::Wildcard);
    if adjacent {
        return Err(AdjacentWildcards);
    }
    Ok(())
}

/// Match `input` against the component sequence. `Some` carries the
/// captured segments, one per wildcard in order; `None` means no match.
///
/// The components must already have passed [`verify_components`].
fn match_components(components: &[Component], input: &str) -> Option<Vec<String>> {
    let bytes = input.as_bytes();
    let mut at = 0usize;
    let mut captures = Vec::new();

    let mut index = 0;
    while index < components.len() {
        match &components[index] {
            Component::Text(text) => {
                let chunk = text.as_bytes();
                if at + chunk.len() > bytes.len() {
                    return None;
                }
                if &bytes[at..at + chunk.len()] != chunk {
                    return None;
                }
                if index == components.len() - 1 && at + chunk.len() < bytes.len() {
                    // everything matched but input remains.
                    return None;
                }
                at += chunk.len();
            }
            Component::Wildcard => {
                if index == components.len() - 1 {
                    // final wildcard captures the remaining suffix.
                    captures.push(lossy(&bytes[at..]));
                    break;
                }
                let Component::Text(anchor) = &components[index + 1] else {
                    unreachable!("adjacency is rejected before matching");
                };
                let anchor = anchor.as_bytes();
                if at + anchor.len() > bytes.len() {
                    return None;
                }
                let anchor_is_last = index == components.len() - 2;
                let mut found = None;
                for shift in 0..=(bytes.len() - at - anchor.len()) {
                    if &bytes[at + shift..at + shift + anchor.len()] == anchor {
                        if anchor_is_last && at + shift + anchor.len() < bytes.len() {
                            // the anchor ends the pattern but not the
                            // input; keep scanning for a later position.
                            continue;
                        }
                        found = Some(shift);
                        break;
                    }
                }
                let shift = found?;
                captures.push(lossy(&bytes[at..at + shift]));
                at += shift + anchor.len();
                index += 1; // the anchor is consumed together with the wildcard.
            }
        }
        index += 1;
    }

    Some(captures)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Match every input against `filter` and weave the captured segments
/// into `product`, left-to-right, one per wildcard. Inputs that do not
/// match pass through unchanged. Surplus captures are discarded.
pub fn compute_replace(
    inputs: &[String],
    filter: &str,
    product: &str,
) -> Result<Vec<String>, ReplaceError> {
    let filter_components = tokenize(filter);
    let product_components = tokenize(product);
    verify_components(&filter_components)?;
    verify_components(&product_components)?;

    let count = |components: &[Component]| {
        components
            .iter()
            .filter(|c| **c == Component::Wildcard)
            .count()
    };
    if count(&product_components) > count(&filter_components) {
        return Err(ReplaceError::ChunksLength);
    }

    let mut output = Vec::with_capacity(inputs.len());
    for element in inputs {
        let Some(captures) = match_components(&filter_components, element) else {
            output.push(element.clone());
            continue;
        };
        let mut captures = captures.into_iter();
        let mut woven = String::new();
        for component in &product_components {
            match component {
                Component::Text(text) => woven.push_str(text),
                Component::Wildcard => woven.push_str(&captures.next().unwrap_or_default()),
            }
        }
        output.push(woven);
    }
    Ok(output)
}

/// Glob the filesystem under `root`: every entry whose root-relative path
/// matches the pattern. Paths are returned without a leading `./`, sorted
/// for stable output.
pub fn compute_paths_in(root: &Path, pattern: &str) -> Result<Vec<String>, AdjacentWildcards> {
    let components = tokenize(pattern);
    verify_components(&components)?;

    let mut paths = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            if match_components(&components, &relative).is_some() {
                paths.push(relative);
            }
            if path.is_dir() {
                pending.push(path);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Glob relative to the working directory.
pub fn compute_paths(pattern: &str) -> Result<Vec<String>, AdjacentWildcards> {
    compute_paths_in(Path::new("."), pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenize_splits_at_wildcards() {
        assert_eq!(
            tokenize("a*b*"),
            vec![
                Component::Text("a".into()),
                Component::Wildcard,
                Component::Text("b".into()),
                Component::Wildcard,
            ]
        );
        assert_eq!(tokenize("plain"), vec![Component::Text("plain".into())]);
        assert_eq!(tokenize("*"), vec![Component::Wildcard]);
    }

    #[test]
    fn match_literal_only_is_exact() {
        let components = tokenize("main.c");
        assert_eq!(match_components(&components, "main.c"), Some(vec![]));
        assert_eq!(match_components(&components, "main.cpp"), None);
        assert_eq!(match_components(&components, "main"), None);
    }

    #[test]
    fn match_captures_one_group_per_wildcard() {
        let components = tokenize("src/*.c");
        assert_eq!(
            match_components(&components, "src/main.c"),
            Some(vec!["main".to_string()])
        );
        assert_eq!(match_components(&components, "lib/main.c"), None);
    }

    #[test]
    fn final_wildcard_captures_suffix() {
        let components = tokenize("build/*");
        assert_eq!(
            match_components(&components, "build/debug/app"),
            Some(vec!["debug/app".to_string()])
        );
    }

    #[test]
    fn trailing_anchor_must_end_input() {
        let components = tokenize("*.c");
        assert_eq!(match_components(&components, "a.c.c"), Some(vec!["a.c".to_string()]));
        assert_eq!(match_components(&components, "a.cx"), None);
    }

    #[test]
    fn multiple_wildcards_capture_in_order() {
        let components = tokenize("*/*.c");
        assert_eq!(
            match_components(&components, "src/main.c"),
            Some(vec!["src".to_string(), "main".to_string()])
        );
    }

    #[test]
    fn empty_capture_is_allowed() {
        let components = tokenize("a*b");
        assert_eq!(match_components(&components, "ab"), Some(vec![String::new()]));
    }

    #[test]
    fn adjacent_wildcards_are_rejected_deterministically() {
        assert_eq!(
            compute_replace(&strings(&["x"]), "a**b", "c*"),
            Err(ReplaceError::AdjacentWildcards(AdjacentWildcards))
        );
        assert_eq!(compute_paths_in(Path::new("."), "**"), Err(AdjacentWildcards));
    }

    #[test]
    fn replace_weaves_captures() {
        let output = compute_replace(&strings(&["a.c", "b.c"]), "*.c", "*.o").unwrap();
        assert_eq!(output, strings(&["a.o", "b.o"]));
    }

    #[test]
    fn replace_passes_nonmatching_through() {
        let output = compute_replace(&strings(&["a.c", "notes.txt"]), "*.c", "*.o").unwrap();
        assert_eq!(output, strings(&["a.o", "notes.txt"]));
    }

    #[test]
    fn replace_without_wildcards_is_identity_or_substitution() {
        // a wildcard-free filter only matches itself; everything else
        // passes through.
        let output = compute_replace(&strings(&["a.c", "b.c"]), "a.c", "a.c").unwrap();
        assert_eq!(output, strings(&["a.c", "b.c"]));
    }

    #[test]
    fn replace_discards_surplus_captures() {
        let output = compute_replace(&strings(&["src/main.c"]), "*/*.c", "*.o").unwrap();
        assert_eq!(output, strings(&["src.o"]));
    }

    #[test]
    fn replace_rejects_more_product_wildcards() {
        assert_eq!(
            compute_replace(&strings(&["a.c"]), "*.c", "*/*.o"),
            Err(ReplaceError::ChunksLength)
        );
    }

    #[test]
    fn glob_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        File::create(dir.path().join("src/a.c")).unwrap();
        File::create(dir.path().join("src/b.c")).unwrap();
        File::create(dir.path().join("src/notes.txt")).unwrap();

        let paths = compute_paths_in(dir.path(), "src/*.c").unwrap();
        assert_eq!(paths, strings(&["src/a.c", "src/b.c"]));
    }

    #[test]
    fn glob_without_wildcard_matches_the_literal_path() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("exact")).unwrap();
        let paths = compute_paths_in(dir.path(), "exact").unwrap();
        assert_eq!(paths, strings(&["exact"]));
    }

    #[test]
    fn glob_scalar_versus_list_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("x")).unwrap();
        File::create(dir.path().join("x/1")).unwrap();
        let paths = compute_paths_in(dir.path(), "x/*").unwrap();
        assert_eq!(paths.len(), 1);

        File::create(dir.path().join("x/2")).unwrap();
        let paths = compute_paths_in(dir.path(), "x/*").unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn glob_crosses_directory_separators() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        File::create(dir.path().join("a/b/deep.c")).unwrap();
        let paths = compute_paths_in(dir.path(), "*.c").unwrap();
        assert_eq!(paths, strings(&["a/b/deep.c"]));
    }
}
