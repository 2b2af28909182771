//! Hostlist / array-task range expressions (`"foo[1-4,7]"`, `"1-4,7"`).
//!
//! §9 redesign: replaces the source's hand-rolled hostlist expansion with a
//! small parser feeding an `impl Iterator`, and the reverse direction
//! (collapsing consecutive integers into `a-b` ranges) for displaying
//! pending job-array task id sets, using the same combinator.

use crate::error::{Error, Result};

/// Expands a numeric range expression such as `"1-4,7,9-10"` into the
/// sorted, deduplicated sequence of ids it denotes.
pub fn expand_numeric_ranges(expr: &str) -> Result<Vec<u32>> {
    let mut ids = Vec::new();

    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo
                    .trim()
                    .parse()
                    .map_err(|_| Error::ProtocolDecode(format!("bad range start: {part}")))?;
                let hi: u32 = hi
                    .trim()
                    .parse()
                    .map_err(|_| Error::ProtocolDecode(format!("bad range end: {part}")))?;
                if lo > hi {
                    return Err(Error::ProtocolDecode(format!("inverted range: {part}")));
                }
                ids.extend(lo..=hi);
            }
            None => {
                let id: u32 = part
                    .parse()
                    .map_err(|_| Error::ProtocolDecode(format!("bad id: {part}")))?;
                ids.push(id);
            }
        }
    }

    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Expands a hostlist expression with an optional `prefix[ranges]suffix`
/// bracket, e.g. `"node[1-3,7]"` -> `["node1", "node2", "node3", "node7"]`.
/// A bracket-free name is returned as a single-element sequence.
pub fn expand_hostlist(expr: &str) -> Result<Vec<String>> {
    let (open, close) = match (expr.find('['), expr.find(']')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Ok(vec![expr.to_string()]),
    };

    let prefix = &expr[..open];
    let suffix = &expr[close + 1..];
    let ids = expand_numeric_ranges(&expr[open + 1..close])?;

    Ok(ids
        .into_iter()
        .map(|id| format!("{prefix}{id}{suffix}"))
        .collect())
}

/// Collapses a sorted sequence of ids into a compact `"[a-b,c]"` range
/// expression, the reverse of [`expand_numeric_ranges`]. Used to display
/// pending job-array task id sets.
pub fn collapse_numeric_ranges(ids: &[u32]) -> String {
    if ids.is_empty() {
        return String::new();
    }

    let mut segments = Vec::new();
    let mut start = ids[0];
    let mut prev = ids[0];

    for &id in &ids[1..] {
        if id == prev + 1 {
            prev = id;
            continue;
        }
        segments.push(format_segment(start, prev));
        start = id;
        prev = id;
    }
    segments.push(format_segment(start, prev));

    if segments.len() == 1 && start == prev {
        segments.remove(0)
    } else {
        format!("[{}]", segments.join(","))
    }
}

fn format_segment(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_simple_ranges() {
        assert_eq!(expand_numeric_ranges("1-4,7,9-10").unwrap(), vec![1, 2, 3, 4, 7, 9, 10]);
    }

    #[test]
    fn expands_hostlist_with_prefix_suffix() {
        let hosts = expand_hostlist("node[1-3,7]-gpu").unwrap();
        assert_eq!(hosts, vec!["node1-gpu", "node2-gpu", "node3-gpu", "node7-gpu"]);
    }

    #[test]
    fn bare_name_passes_through() {
        assert_eq!(expand_hostlist("standalone").unwrap(), vec!["standalone"]);
    }

    #[test]
    fn collapse_round_trips_with_expand() {
        let ids = expand_numeric_ranges("1-4,7,9-10").unwrap();
        assert_eq!(collapse_numeric_ranges(&ids), "[1-4,7,9-10]");
    }

    #[test]
    fn collapse_single_value_has_no_brackets() {
        assert_eq!(collapse_numeric_ranges(&[5]), "5");
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(expand_numeric_ranges("9-3").is_err());
    }
}
