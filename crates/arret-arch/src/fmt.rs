//! Rendering of printf-style opcode format strings.
//!
//! Opcode tables carry format strings like `"LD BC,$%04X"` with at most one
//! `%0<width>X` placeholder for the immediate. The `@` address markers are
//! literal characters inside the strings.

/// Substitutes the single `%0<width>X` placeholder with `value` in
/// zero-padded uppercase hex. Strings without a placeholder pass through.
pub(crate) fn render(fmt: &str, value: u32) -> String {
    let Some(pos) = fmt.find('%') else {
        return fmt.to_string();
    };

    let mut out = String::with_capacity(fmt.len() + 8);
    out.push_str(&fmt[..pos]);

    let rest = &fmt[pos + 1..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let tail = &rest[digits.len()..];
    let width: usize = digits.trim_start_matches('0').parse().unwrap_or(0);

    match tail.chars().next() {
        Some('X') => {
            out.push_str(&format!("{value:0width$X}"));
            out.push_str(&tail[1..]);
        }
        _ => out.push_str(rest),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn renders_widths() {
        assert_eq!(render("LD B,$%02X", 0x7), "LD B,$07");
        assert_eq!(render("JP $@%04X", 0x150), "JP $@0150");
        assert_eq!(render("LDH ($@FF%02X),A", 0x44), "LDH ($@FF44),A");
        assert_eq!(render("NOP", 0), "NOP");
    }
}
