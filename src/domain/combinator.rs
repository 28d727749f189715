//! Cross-timeframe query combination.

/// Set operator placed between per-timeframe queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMode {
    /// Entity must satisfy every timeframe.
    #[default]
    Intersect,
    /// Entity may satisfy any timeframe.
    Union,
}

impl CombineMode {
    fn separator(self) -> &'static str {
        match self {
            CombineMode::Intersect => "\nINTERSECT\n",
            CombineMode::Union => "\nUNION\n",
        }
    }
}

/// Drops empty queries; a single survivor is returned unchanged.
///
/// Returns an empty string when nothing survives. Callers gate on rule
/// emptiness before compiling, so that case means "no filter".
pub fn combine<S: AsRef<str>>(queries: &[S], mode: CombineMode) -> String {
    let parts: Vec<&str> = queries
        .iter()
        .map(|q| q.as_ref())
        .filter(|q| !q.trim().is_empty())
        .collect();
    match parts.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        many => many.join(mode.separator()),
    }
}
