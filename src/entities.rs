/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const QUOT: &str = "&quot;";
}

pub fn escaped_size(s: &str) -> usize {
    let mut size = 0;
    for c in s.chars() {
        match c {
            '<' => size += predefined::LT.len(),
            '>' => size += predefined::GT.len(),
            '&' => size += predefined::AMP.len(),
            '"' => size += predefined::QUOT.len(),
            _ => size += c.len_utf8(),
        }
    }

    size
}

/// Escapes character data.
pub fn escape(s: &str, buf: &mut String) {
    for c in s.chars() {
        match c {
            '<' => buf.push_str(predefined::LT),
            '>' => buf.push_str(predefined::GT),
            '&' => buf.push_str(predefined::AMP),
            _ => buf.push(c),
        }
    }
}

/// Escapes a value for use inside a double quoted attribute.
pub fn escape_attribute(s: &str, buf: &mut String) {
    for c in s.chars() {
        match c {
            '<' => buf.push_str(predefined::LT),
            '>' => buf.push_str(predefined::GT),
            '&' => buf.push_str(predefined::AMP),
            '"' => buf.push_str(predefined::QUOT),
            _ => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_size() {
        const NOESCAPE: &str = "abc$#@!%^*(){}[]=-+/.,;:FDSF3443";
        assert_eq!(escaped_size(NOESCAPE), NOESCAPE.len());
        assert_eq!(escaped_size("abc&def"), "abc&amp;def".len());
        assert_eq!(escaped_size("<>&\""), "&lt;&gt;&amp;&quot;".len());
        assert_eq!(escaped_size("ışık"), "ışık".len());
    }

    #[test]
    fn escaping() {
        let mut buf = String::new();
        escape("a<b & \"c\">", &mut buf);
        assert_eq!(buf, "a&lt;b &amp; \"c\"&gt;");

        buf.clear();
        escape_attribute("a<b & \"c\">", &mut buf);
        assert_eq!(buf, "a&lt;b &amp; &quot;c&quot;&gt;");
    }
}
