use curv::{Scanner, Script, TokenKind};

/// Concatenating `source[first_white..last]` over the token stream must
/// reconstruct the script byte for byte, including comments and layout.
fn roundtrip(source: &str) {
    let mut scanner = Scanner::new(Script::new("test", source));
    let mut rebuilt = String::new();
    loop {
        let tok = scanner.get_token().expect("scan");
        rebuilt.push_str(&source[tok.first_white as usize..tok.last as usize]);
        if tok.kind == TokenKind::End {
            break;
        }
    }
    assert_eq!(rebuilt, source);
}

#[test]
fn roundtrip_simple_expression() {
    roundtrip("1 + 2 * 3");
}

#[test]
fn roundtrip_preserves_layout_and_comments() {
    roundtrip("// leading comment\nlet (x = 3,   y = 4)\n  norm[x, y] // trailing\n");
}

#[test]
fn roundtrip_crlf_line_endings() {
    roundtrip("1 + 2\r\n// comment\r\nsqrt 4\r\n");
}

#[test]
fn roundtrip_strings_and_operators() {
    roundtrip("{msg = \"a < b && c\"; n = 1..<10 by 2; f(x) = x^2}");
}

#[test]
fn roundtrip_trailing_whitespace() {
    roundtrip("pi   ");
}
