use std::env;

pub const DEFAULT_TERMINAL_WIDTH: usize = 120;

/// Width of the attached terminal. `COLUMNS` overrides the queried size; without
/// either the default is used.
pub fn terminal_width() -> usize {
    let queried = crossterm::terminal::size().ok().map(|(cols, _rows)| cols);
    resolve_width(env::var("COLUMNS").ok().as_deref(), queried)
}

fn resolve_width(columns: Option<&str>, queried: Option<u16>) -> usize {
    columns
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
        .or_else(|| queried.map(usize::from).filter(|w| *w > 0))
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
}

pub fn format_symbols<I, T>(symbols: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    format_symbols_with_width(symbols, terminal_width())
}

/// Sorted, column aligned rendering of a model used in failure messages.
pub fn format_symbols_with_width<I, T>(symbols: I, width: usize) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    let mut symbols: Vec<String> = symbols
        .into_iter()
        .map(|s| s.to_string().trim().to_string())
        .collect();
    if symbols.is_empty() {
        return "<empty>".to_string();
    }
    symbols.sort();

    let col_width = symbols.iter().map(|s| s.chars().count()).max().unwrap_or(0) + 2;
    let cols = (width / col_width).max(1);
    symbols
        .chunks(cols)
        .map(|row| {
            row.iter()
                .map(|s| format!("{s:<col_width$}"))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
