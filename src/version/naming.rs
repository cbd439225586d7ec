//! Checkin version names
//!
//! - the first successor of the root is `1.0`, later root successors `2.0`, `3.0`, ...
//! - a successor of `a.b` is `a.(b+1)` if free
//! - otherwise it branches: `a.b.1`, `a.b.2`, ...

/// Picks the predecessor to derive a name from: the shortest name wins,
/// the earliest one on ties.
pub fn naming_base<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .fold(None, |best: Option<&'a str>, name| match best {
            Some(b) if b.len() <= name.len() => Some(b),
            _ => Some(name),
        })
}

/// Calculates the name of a version checked in on top of `base`.
///
/// `taken` reports whether a name is already used in the history.
pub fn next_version_name(base: &str, base_is_root: bool, taken: impl Fn(&str) -> bool) -> String {
    if base_is_root {
        return (1u64..)
            .map(|major| format!("{}.0", major))
            .find(|name| !taken(name))
            .unwrap_or_default();
    }

    if let Some((prefix, last)) = base.rsplit_once('.') {
        if let Ok(last) = last.parse::<u64>() {
            let straight = format!("{}.{}", prefix, last + 1);
            if !taken(&straight) {
                return straight;
            }
        }
    }

    (1u64..)
        .map(|branch| format!("{}.{}", base, branch))
        .find(|name| !taken(name))
        .unwrap_or_default()
}
