/// Which container kind a child hangs under. Collections join with a dot,
/// lists with a bracketed index.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    Collection,
    List,
}

/// Build the materialized path of a child from its parent's path.
///
/// Collection children use `parent.idShort`; list children use
/// `parent[position]` and ignore `id_short`. Path-syntax characters inside
/// `id_short` are not escaped.
pub fn child_path(
    parent_path: &str,
    id_short: &str,
    kind: ContainerKind,
    position: i32,
) -> String {
    match kind {
        ContainerKind::Collection => format!("{parent_path}.{id_short}"),
        ContainerKind::List => format!("{parent_path}[{position}]"),
    }
}

/// Split a path that ends in `[<index>]` into the container's path and the
/// index. Returns `None` when the path does not end in a well-formed,
/// non-negative index.
pub fn parse_trailing_index(path: &str) -> Option<(&str, i32)> {
    let rest = path.strip_suffix(']')?;
    let open = rest.rfind('[')?;
    let digits = &rest[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: i32 = digits.parse().ok()?;
    Some((&rest[..open], index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_children_join_with_a_dot() {
        assert_eq!(
            child_path("sensors", "temperature", ContainerKind::Collection, 3),
            "sensors.temperature"
        );
        assert_eq!(
            child_path("a.b", "c", ContainerKind::Collection, 0),
            "a.b.c"
        );
    }

    #[test]
    fn list_children_join_with_an_index() {
        assert_eq!(child_path("lst", "ignored", ContainerKind::List, 0), "lst[0]");
        assert_eq!(child_path("a.lst", "", ContainerKind::List, 12), "a.lst[12]");
    }

    #[test]
    fn trailing_index_is_recognized() {
        assert_eq!(parse_trailing_index("lst[0]"), Some(("lst", 0)));
        assert_eq!(parse_trailing_index("a.b[17]"), Some(("a.b", 17)));
        assert_eq!(parse_trailing_index("lst[2][3]"), Some(("lst[2]", 3)));
    }

    #[test]
    fn malformed_trailing_indexes_are_rejected() {
        assert_eq!(parse_trailing_index("plain"), None);
        assert_eq!(parse_trailing_index("lst[]"), None);
        assert_eq!(parse_trailing_index("lst[x]"), None);
        assert_eq!(parse_trailing_index("lst[-1]"), None);
        assert_eq!(parse_trailing_index("lst[1"), None);
        assert_eq!(parse_trailing_index("lst1]"), None);
    }
}
