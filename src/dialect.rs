// 🔎 Dialect Sniffer - Figure out the field delimiter of an unknown file
//
// Strategy:
// 1. Count candidates in the first non-empty line (outside quotes), highest wins
// 2. Otherwise look for a candidate with a stable per-line count across the sample
// 3. Otherwise tab if one shows up anywhere in a larger sample, else comma
//
// Always produces a delimiter, never an error.

use crate::config::ImportConfig;
use std::collections::HashMap;

/// Candidate delimiters, in tie-break order
pub const CANDIDATES: [u8; 4] = [b',', b'\t', b';', b'|'];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Sniff with default sample sizes
pub fn sniff_delimiter(data: &[u8]) -> u8 {
    sniff_delimiter_with(data, &ImportConfig::default())
}

pub fn sniff_delimiter_with(data: &[u8], config: &ImportConfig) -> u8 {
    let data = strip_bom(data);
    let sample = &data[..data.len().min(config.sniff_sample_bytes)];
    let text = String::from_utf8_lossy(sample);

    if let Some(delimiter) = from_first_line(&text) {
        log::debug!("Delimiter {:?} picked from first line", delimiter as char);
        return delimiter;
    }

    // A sample cut mid-line would skew the per-line counts
    let truncated = sample.len() < data.len();
    if let Some(delimiter) = from_line_consistency(&text, truncated) {
        log::debug!("Delimiter {:?} picked by consistency heuristic", delimiter as char);
        return delimiter;
    }

    let wide = &data[..data.len().min(config.sniff_fallback_bytes)];
    if wide.contains(&b'\t') {
        b'\t'
    } else {
        b','
    }
}

pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// Human-friendly name for summaries
pub fn delimiter_name(delimiter: u8) -> &'static str {
    match delimiter {
        b',' => "comma",
        b'\t' => "tab",
        b';' => "semicolon",
        b'|' => "pipe",
        _ => "other",
    }
}

fn from_first_line(text: &str) -> Option<u8> {
    let line = text.lines().find(|l| !l.trim().is_empty())?;

    let mut best: Option<(u8, usize)> = None;
    for candidate in CANDIDATES {
        let count = count_unquoted(line, candidate);
        if count == 0 {
            continue;
        }
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((candidate, count)),
        }
    }

    best.map(|(delimiter, _)| delimiter)
}

fn from_line_consistency(text: &str, truncated: bool) -> Option<u8> {
    let mut lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if truncated && lines.len() > 1 {
        lines.pop();
    }
    if lines.len() < 2 {
        return None;
    }

    let mut best: Option<(u8, usize, usize)> = None; // (delimiter, lines agreeing, count)
    for candidate in CANDIDATES {
        let mut frequency: HashMap<usize, usize> = HashMap::new();
        for line in &lines {
            let count = count_unquoted(line, candidate);
            if count > 0 {
                *frequency.entry(count).or_insert(0) += 1;
            }
        }

        // Most common non-zero count; ties prefer more fields
        let Some((&count, &agreeing)) = frequency
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)))
        else {
            continue;
        };

        // Needs to hold for at least half of the lines
        if agreeing * 2 < lines.len() {
            continue;
        }

        match best {
            Some((_, best_agreeing, best_count))
                if (best_agreeing, best_count) >= (agreeing, count) => {}
            _ => best = Some((candidate, agreeing, count)),
        }
    }

    best.map(|(delimiter, _, _)| delimiter)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_header() {
        assert_eq!(sniff_delimiter(b"Name;Vendor;Score\nAlpha;Acme;7\n"), b';');
    }

    #[test]
    fn test_tab_header() {
        assert_eq!(sniff_delimiter(b"Name\tVendor\tScore\nAlpha\tAcme\t7\n"), b'\t');
    }

    #[test]
    fn test_pipe_and_comma() {
        assert_eq!(sniff_delimiter(b"Name|Vendor|Score\n"), b'|');
        assert_eq!(sniff_delimiter(b"Name,Vendor,Score\n"), b',');
    }

    #[test]
    fn test_quoted_commas_do_not_count() {
        let data = b"\"Name, full\";\"Vendor, legal\";Score\n";
        assert_eq!(sniff_delimiter(data), b';');
    }

    #[test]
    fn test_bom_and_leading_blank_lines() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"\n\n  \nName|Vendor\n");
        assert_eq!(sniff_delimiter(&data), b'|');
    }

    #[test]
    fn test_single_column_header_uses_consistency() {
        // Header has no delimiter, body rows agree on semicolons
        let data = b"Applications\nAlpha;1\nBeta;2\nGamma;3\n";
        assert_eq!(sniff_delimiter(data), b';');
    }

    #[test]
    fn test_fallback_to_comma() {
        assert_eq!(sniff_delimiter(b"Name\nAlpha\nBeta\n"), b',');
        assert_eq!(sniff_delimiter(b""), b',');
    }

    #[test]
    fn test_fallback_to_tab_in_wide_sample() {
        let mut config = ImportConfig::default();
        config.sniff_sample_bytes = 5;
        // Tab only appears past the sniffing sample
        let data = b"Name\nAlpha\nBeta\tx\n";
        assert_eq!(sniff_delimiter_with(data, &config), b'\t');
    }
}
