//! Printable-string scan over raw metadata bytes.
//!
//! A summary does not walk the handle tree, so state file locations are
//! recovered the blunt way: collect printable ASCII runs out of the raw
//! buffer and keep the ones that look like state paths.

use std::collections::HashSet;

const MIN_RUN: usize = 6;

const PATH_PREFIXES: [&str; 4] = ["s3://", "hdfs://", "file:/", "gs://"];

/// Maximal runs of printable ASCII (0x20..=0x7E) of length >= 6, deduplicated
/// preserving first-occurrence order.
pub fn scan_inline_strings(data: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = Vec::with_capacity(128);
    for &b in data {
        if (0x20..=0x7E).contains(&b) {
            current.push(b);
            continue;
        }
        flush_run(&mut current, &mut strings);
    }
    flush_run(&mut current, &mut strings);
    dedupe(strings)
}

/// The subset of scanned strings that start with a known state-path scheme.
pub fn extract_state_file_paths(data: &[u8]) -> Vec<String> {
    scan_inline_strings(data)
        .into_iter()
        .filter(|s| PATH_PREFIXES.iter().any(|prefix| s.starts_with(prefix)))
        .collect()
}

fn flush_run(current: &mut Vec<u8>, strings: &mut Vec<String>) {
    if current.len() >= MIN_RUN {
        strings.push(String::from_utf8_lossy(current).into_owned());
    }
    current.clear();
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(values.len());
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}
