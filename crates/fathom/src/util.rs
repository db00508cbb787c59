use crate::state::FileData;

/// Maximum characters per rendered line before it is split into numbered
/// chunks (`N.1`, `N.2`, ...).
pub(crate) const LINE_CHUNK_SIZE: usize = 2000;

/// Exact text returned when reading a file that exists but has no content.
pub(crate) const EMPTY_FILE_REMINDER: &str =
    "System reminder: File exists but has empty contents";

/// Normalize a virtual path: reject blank input, prepend the mandatory
/// leading slash when absent.
pub(crate) fn normalize_path(path: &str) -> Result<String, String> {
    if path.trim().is_empty() {
        return Err("Error: Path cannot be empty or whitespace-only".to_string());
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{path}"))
    }
}

/// Normalize a listing prefix: empty or blank becomes `/`, a leading slash
/// is prepended and a trailing slash appended when missing.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    if prefix.trim().is_empty() {
        return "/".to_string();
    }
    let mut p = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// Find the largest byte index that is a char boundary at or below `target`.
pub(crate) fn floor_char_boundary(text: &str, target: usize) -> usize {
    let mut pos = target.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Render file content for the model: lines `offset .. offset + limit`
/// (0-based offset), each prefixed with a right-aligned width-6 line number
/// and a tab. Long lines are split into `N.1`, `N.2`, ... chunks. Empty
/// files and out-of-range offsets produce the contract's sentinel strings.
pub(crate) fn render_read(data: &FileData, offset: usize, limit: usize) -> String {
    if data.is_empty() {
        return EMPTY_FILE_REMINDER.to_string();
    }

    let total = data.content.len();
    if offset >= total {
        return format!("Error: Line offset {offset} exceeds file length ({total} lines)");
    }

    let end = offset.saturating_add(limit).min(total);
    let mut out = String::new();
    for (idx, line) in data.content[offset..end].iter().enumerate() {
        let line_num = offset + idx + 1;
        if line.len() <= LINE_CHUNK_SIZE {
            out.push_str(&format!("{line_num:>6}\t{line}\n"));
        } else {
            let mut rest = line.as_str();
            let mut part = 1usize;
            while !rest.is_empty() {
                let cut = floor_char_boundary(rest, LINE_CHUNK_SIZE);
                let label = format!("{line_num}.{part}");
                out.push_str(&format!("{label:>6}\t{}\n", &rest[..cut]));
                rest = &rest[cut..];
                part += 1;
            }
        }
    }
    out
}

/// Match a relative path against a glob pattern. `*` stays within one path
/// segment, `**` crosses separators, and leading dots only match when
/// `match_hidden` is set.
pub(crate) fn path_matches_glob(pattern: &str, path: &str, match_hidden: bool) -> bool {
    let Ok(compiled) = glob::Pattern::new(pattern) else {
        return false;
    };
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: !match_hidden,
    };
    compiled.matches_with(path, options)
}

/// Match an `include` filter against a grep hit. Filters without a `/` are
/// matched against the file name alone, filters with one against the whole
/// relative path.
pub(crate) fn include_matches(include: &str, rel_path: &str) -> bool {
    if include.contains('/') {
        path_matches_glob(include, rel_path, true)
    } else {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        path_matches_glob(include, name, true)
    }
}
