/// One dotted-path segment: `name`, `name[3]` or `[3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment<'a> {
    pub raw: &'a str,
    pub name: &'a str,
    pub index: Option<usize>,
}

/// Parses a single segment. Returns `None` for an unparsable index such as
/// `items[x]` or `items[-1]`.
pub fn parse_segment(raw: &str) -> Option<PathSegment<'_>> {
    match (raw.find('['), raw.ends_with(']')) {
        (Some(open), true) => {
            let index = raw[open + 1..raw.len() - 1].parse::<usize>().ok()?;
            Some(PathSegment {
                raw,
                name: &raw[..open],
                index: Some(index),
            })
        }
        _ => Some(PathSegment {
            raw,
            name: raw,
            index: None,
        }),
    }
}

/// Formats the derived name of an item held at `index` by an ordered parent.
pub fn indexed_name(field: &str, index: usize) -> String {
    format!("{field}[{index}]")
}
