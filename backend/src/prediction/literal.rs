//! Tuple-literal rendering of prediction results, the format the frontend
//! displays verbatim: `('Aphid', ['Neonicotinoids', 'Pyrethroids'])`.

pub fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

pub fn list<T, F>(items: &[T], render: F) -> String
where
    F: Fn(&T) -> String,
{
    let inner: Vec<String> = items.iter().map(render).collect();
    format!("[{}]", inner.join(", "))
}

pub fn string_list(items: &[String]) -> String {
    list(items, |s| quote(s))
}

pub fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "None".to_string())
}

pub fn pair(first: &str, second: &str) -> String {
    format!("({}, {})", first, second)
}
