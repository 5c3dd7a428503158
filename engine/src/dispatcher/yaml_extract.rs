/// Scans free-form agent stdout for the last well-formed YAML block and
/// returns its inner text (§4.F: "extracts the last well-formed YAML
/// block"). Agents wrap structured output in a fenced ```yaml block, so the
/// last fence pair wins over any earlier commentary or retried attempts the
/// agent printed along the way. Falls back to a trailing `---`/`...`
/// document if no fence is present.
pub fn extract_last_yaml_block(text: &str) -> Option<String> {
    if let Some(block) = last_fenced_block(text) {
        return Some(block);
    }
    last_document_marker_block(text)
}

fn last_fenced_block(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut best: Option<String> = None;
    let mut open: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match open {
                None => {
                    let lang = trimmed.trim_start_matches('`').trim();
                    if lang.is_empty() || lang.eq_ignore_ascii_case("yaml") || lang.eq_ignore_ascii_case("yml") {
                        open = Some(i);
                    }
                }
                Some(start) => {
                    best = Some(lines[start + 1..i].join("\n"));
                    open = None;
                }
            }
        }
    }

    best
}

/// A bare `---\n...\n...` document with no surrounding fence, as some
/// agents emit when asked to print only the YAML result.
fn last_document_marker_block(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().rposition(|l| l.trim() == "---")?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.trim() == "...")
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());
    let block = lines[start + 1..end].join("\n");
    if block.trim().is_empty() {
        None
    } else {
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_of_multiple_fenced_blocks() {
        let text = "thinking...\n```yaml\nresult: draft\n```\nmore thinking\n```yaml\nresult: success\nbrief: ok\n```\n";
        let extracted = extract_last_yaml_block(text).unwrap();
        assert!(extracted.contains("result: success"));
        assert!(!extracted.contains("draft"));
    }

    #[test]
    fn accepts_bare_fence_with_no_language_tag() {
        let text = "```\nresult: success\n```\n";
        let extracted = extract_last_yaml_block(text).unwrap();
        assert_eq!(extracted.trim(), "result: success");
    }

    #[test]
    fn falls_back_to_document_markers_without_fence() {
        let text = "some log line\n---\nresult: success\ncost_usd: 0.04\n...\ntrailing noise\n";
        let extracted = extract_last_yaml_block(text).unwrap();
        assert!(extracted.contains("result: success"));
        assert!(!extracted.contains("trailing noise"));
    }

    #[test]
    fn returns_none_when_no_yaml_present() {
        assert!(extract_last_yaml_block("just some plain text output").is_none());
    }
}
