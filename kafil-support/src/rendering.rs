//! Text rendering for diagnostics.
//!
//! Type names coming out of [`std::any::type_name`] are long and noisy.
//! These helpers turn them into something a human can scan in a log line
//! or an error message.

/// Renders a resolution chain, shortening every type name.
///
/// ```
/// use kafil_support::rendering::render_chain;
///
/// let chain = ["app::OrderService", "app::data::UnitOfWork", "app::OrderService"];
/// assert_eq!(render_chain(&chain), "OrderService → UnitOfWork → OrderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|name| shorten_type_name(name.as_ref()))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Shortens a fully qualified type name for display.
///
/// Every path segment is reduced to its last component, generic
/// arguments included.
///
/// ```
/// use kafil_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::services::OrderService"), "OrderService");
/// assert_eq!(
///     shorten_type_name("alloc::vec::Vec<alloc::sync::Arc<dyn app::data::Repository<app::User>>>"),
///     "Vec<Arc<dyn Repository<User>>>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Picks registered names that look like `requested`, best match first.
///
/// Used for "did you mean" hints when a required service is missing.
pub fn suggest_similar<'a>(
    requested: &str,
    available: impl IntoIterator<Item = &'a str>,
    max_suggestions: usize,
) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(String, usize)> = available
        .into_iter()
        .filter(|name| *name != requested)
        .filter_map(|name| {
            let short = shorten_type_name(name).to_lowercase();
            if short == wanted {
                return Some((name.to_string(), 100));
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((name.to_string(), 80));
            }

            let prefix = short
                .chars()
                .zip(wanted.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (prefix >= 3).then(|| (name.to_string(), prefix * 10))
        })
        .collect();

    // stable: equal scores keep registration order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.dedup_by(|a, b| a.0 == b.0);
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name)
        .collect()
}
