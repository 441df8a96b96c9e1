//! Minimal HTML tokenizer for embed markup.
//!
//! Produces a flat list of [`Token`]s (start tags, end tags, and anything the
//! embed grammar never contains). Text between tags is skipped. Attribute
//! names are lowercased and attribute values are entity-decoded, so the rule
//! walk in [`super`] sees what a browser would see rather than the raw bytes.

/// A single attribute on a start or end tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// ASCII-lowercased attribute name.
    pub name: String,
    /// Entity-decoded value, `None` for a bare attribute such as `async`.
    pub value: Option<String>,
}

impl Attribute {
    /// The decoded value, or `""` for a bare attribute.
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// A structural unit of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<name attr=...>` or `<name ... />`.
    Start { name: String, attrs: Vec<Attribute> },
    /// `</name>`, with any attributes written after the name.
    End { name: String, attrs: Vec<Attribute> },
    /// `<!...>`: comments, doctypes, CDATA.
    Declaration,
    /// `<?...>`.
    ProcessingInstruction,
    /// A tag that was opened but never closed before the input ended.
    Unterminated,
}

/// Split `input` into tokens.
///
/// Never fails: malformed constructs become [`Token::Unterminated`],
/// [`Token::Declaration`] or [`Token::ProcessingInstruction`], which the embed
/// grammar rejects.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        src: input,
        bytes: input.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.run();
    lexer.tokens
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        while let Some(offset) = self.bytes[self.pos..].iter().position(|&b| b == b'<') {
            let lt = self.pos + offset;
            match (self.bytes.get(lt + 1).copied(), self.bytes.get(lt + 2).copied()) {
                (Some(b'/'), Some(c)) if c.is_ascii_alphabetic() => {
                    self.pos = lt + 2;
                    if !self.tag(true) {
                        return;
                    }
                }
                (Some(c), _) if c.is_ascii_alphabetic() => {
                    self.pos = lt + 1;
                    if !self.tag(false) {
                        return;
                    }
                }
                (Some(b'!'), _) => {
                    let terminator = if self.src[lt..].starts_with("<!--") {
                        "-->"
                    } else {
                        ">"
                    };
                    if !self.skip_past(lt + 2, terminator, Token::Declaration) {
                        return;
                    }
                }
                (Some(b'?'), _) => {
                    if !self.skip_past(lt + 2, ">", Token::ProcessingInstruction) {
                        return;
                    }
                }
                // A bare `<` is text.
                _ => self.pos = lt + 1,
            }
        }
    }

    /// Emit `token` and move past the next `terminator`. Returns `false` when
    /// the input ends first.
    fn skip_past(&mut self, from: usize, terminator: &str, token: Token) -> bool {
        match self.src[from..].find(terminator) {
            Some(idx) => {
                self.tokens.push(token);
                self.pos = from + idx + terminator.len();
                true
            }
            None => {
                self.tokens.push(Token::Unterminated);
                self.pos = self.bytes.len();
                false
            }
        }
    }

    /// Parse a tag whose name starts at the cursor. End tags are parsed the
    /// same way as start tags: browsers ignore their attributes, but the
    /// accepted markup still carries them.
    fn tag(&mut self, closing: bool) -> bool {
        let name = self.tag_name();
        let mut attrs = Vec::new();
        loop {
            self.skip_while(|b| b.is_ascii_whitespace() || b == b'/');
            match self.peek() {
                None => {
                    self.push_tag(closing, name, attrs);
                    self.tokens.push(Token::Unterminated);
                    return false;
                }
                Some(b'>') => {
                    self.pos += 1;
                    self.push_tag(closing, name, attrs);
                    return true;
                }
                Some(_) => {
                    let (attr, complete) = self.attribute();
                    attrs.push(attr);
                    if !complete {
                        self.push_tag(closing, name, attrs);
                        self.tokens.push(Token::Unterminated);
                        return false;
                    }
                }
            }
        }
    }

    fn push_tag(&mut self, closing: bool, name: String, attrs: Vec<Attribute>) {
        self.tokens.push(if closing {
            Token::End { name, attrs }
        } else {
            Token::Start { name, attrs }
        });
    }

    /// Parse one attribute. The flag is `false` when a quoted value runs off
    /// the end of the input; the partial attribute is still returned so that
    /// later rules can inspect it.
    fn attribute(&mut self) -> (Attribute, bool) {
        let src = self.src;
        let start = self.pos;
        // A leading `=` is part of the name.
        if self.peek() == Some(b'=') {
            self.pos += 1;
        }
        self.skip_while(|b| !(b.is_ascii_whitespace() || b == b'/' || b == b'>' || b == b'='));
        let name = src[start..self.pos].to_ascii_lowercase();

        self.skip_while(|b| b.is_ascii_whitespace());
        if self.peek() != Some(b'=') {
            return (Attribute { name, value: None }, true);
        }
        self.pos += 1;
        self.skip_while(|b| b.is_ascii_whitespace());

        let (raw, complete) = match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let value_start = self.pos + 1;
                match self.bytes[value_start..].iter().position(|&b| b == quote) {
                    Some(len) => {
                        self.pos = value_start + len + 1;
                        (&src[value_start..value_start + len], true)
                    }
                    None => {
                        self.pos = self.bytes.len();
                        (&src[value_start..], false)
                    }
                }
            }
            _ => {
                let value_start = self.pos;
                self.skip_while(|b| !(b.is_ascii_whitespace() || b == b'>'));
                (&src[value_start..self.pos], true)
            }
        };
        let attr = Attribute {
            name,
            value: Some(decode_entities(raw)),
        };
        (attr, complete)
    }

    fn tag_name(&mut self) -> String {
        let start = self.pos;
        self.skip_while(|b| !(b.is_ascii_whitespace() || b == b'/' || b == b'>'));
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
    }
}

/// Decode HTML character references in an attribute value.
///
/// Handles decimal and hex numeric references (with or without the trailing
/// `;`, as browsers do) and the named references used to smuggle URL schemes.
/// Unknown named references are left as written.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_one(rest) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the reference at the start of `s` (which begins with `&`).
/// Returns the character and the number of bytes consumed.
fn decode_one(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];
    if let Some(num) = body.strip_prefix('#') {
        let (digits, radix, prefix_len) = match num.strip_prefix(|c: char| c == 'x' || c == 'X') {
            Some(hex) => (hex, 16, 3),
            None => (num, 10, 2),
        };
        let len = digits
            .bytes()
            .take_while(|b| b.is_ascii_digit() || (radix == 16 && b.is_ascii_hexdigit()))
            .count();
        if len == 0 {
            return None;
        }
        // Out-of-range references decode to U+FFFD, as in browsers.
        let code = u32::from_str_radix(&digits[..len], radix).unwrap_or(u32::MAX);
        let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
        let semi = usize::from(digits[len..].starts_with(';'));
        return Some((ch, prefix_len + len + semi));
    }

    let end = body.find(';')?;
    let ch = match &body[..end] {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "colon" => ':',
        "Tab" => '\t',
        "NewLine" => '\n',
        "sol" => '/',
        "lpar" => '(',
        "rpar" => ')',
        _ => return None,
    };
    Some((ch, end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    #[test]
    fn start_and_end_tags() {
        let tokens = tokenize(r#"<P class="a">hi</P>"#);
        assert_eq!(
            tokens,
            vec![
                Token::Start {
                    name: "p".into(),
                    attrs: vec![attr("class", "a")]
                },
                Token::End { name: "p".into(), attrs: vec![] },
            ]
        );
    }

    #[test]
    fn end_tag_attributes_are_kept() {
        let tokens = tokenize(r#"<a>x</a onclick="x()" href='https://evil.com/'>"#);
        assert_eq!(
            tokens[1],
            Token::End {
                name: "a".into(),
                attrs: vec![attr("onclick", "x()"), attr("href", "https://evil.com/")]
            }
        );
    }

    #[test]
    fn attribute_quoting_styles() {
        let tokens = tokenize(r#"<img src='https://a' alt=x data-x = "y" async/>"#);
        let Token::Start { attrs, .. } = &tokens[0] else {
            panic!("expected start tag, got {tokens:?}");
        };
        assert_eq!(attrs[0], attr("src", "https://a"));
        assert_eq!(attrs[1], attr("alt", "x"));
        assert_eq!(attrs[2], attr("data-x", "y"));
        assert_eq!(
            attrs[3],
            Attribute {
                name: "async".into(),
                value: None
            }
        );
    }

    #[test]
    fn slash_separated_attributes_are_found() {
        let tokens = tokenize(r#"<a/onclick="x">"#);
        let Token::Start { attrs, .. } = &tokens[0] else {
            panic!("expected start tag");
        };
        assert_eq!(attrs[0].name, "onclick");
    }

    #[test]
    fn bare_less_than_is_text() {
        assert!(tokenize("1 < 2 and 3 <= 4").is_empty());
    }

    #[test]
    fn comments_and_declarations() {
        assert_eq!(
            tokenize("<!-- a > b --><!DOCTYPE html><?xml?>"),
            vec![
                Token::Declaration,
                Token::Declaration,
                Token::ProcessingInstruction
            ]
        );
    }

    #[test]
    fn unterminated_tag_keeps_partial_attributes() {
        let tokens = tokenize(r#"<a href="https://evil.com"#);
        assert_eq!(tokens.last(), Some(&Token::Unterminated));
        let has_href = tokens.iter().any(|t| match t {
            Token::Start { attrs, .. } => attrs.iter().any(|a| a.name == "href"),
            _ => false,
        });
        assert!(has_href, "partial href lost: {tokens:?}");
    }

    #[test]
    fn unterminated_comment() {
        assert_eq!(tokenize("<p></p><!-- open"), vec![
            Token::Start { name: "p".into(), attrs: vec![] },
            Token::End { name: "p".into(), attrs: vec![] },
            Token::Unterminated,
        ]);
    }

    #[test]
    fn decodes_numeric_and_named_references() {
        assert_eq!(decode_entities("&#106;ava&#x53;cript&colon;"), "javaScript:");
        assert_eq!(decode_entities("&#106avascript"), "javascript");
        assert_eq!(decode_entities("a&amp;b&lt;c"), "a&b<c");
    }

    #[test]
    fn leaves_unknown_references_alone() {
        assert_eq!(decode_entities("a&copy;b & c&"), "a&copy;b & c&");
        assert_eq!(decode_entities("&#;"), "&#;");
    }
}
