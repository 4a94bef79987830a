//! Identifier tokens of a port expression.
//!
//! Expression text is never evaluated; it is only scanned for identifiers
//! (`[A-Za-z_][A-Za-z0-9_]*`) so references to sibling ports can become
//! edges. Single-quoted string literals are skipped. Digits are never part
//! of a token's start, so `9abc` yields `abc`.

pub fn identifier_tokens(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\'' {
            // '' inside a literal is an escaped quote.
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
        } else if b.is_ascii_digit() {
            // A digit run never starts a token; letters right after it do.
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        } else if is_word(b) {
            let start = i;
            while i < bytes.len() && is_word(bytes[i]) {
                i += 1;
            }
            out.push(&text[start..i]);
        } else {
            i += 1;
        }
    }
    out
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
