//! ISO 9660 identifier character classes.

/// d-characters: the strict identifier set (`A`–`Z`, `0`–`9`, `_`).
pub fn is_dchar(c: u8) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == b'_'
}

/// a-characters: d-characters plus space and ``!"%&'()*+,-./:;<=>?``.
pub fn is_achar(c: u8) -> bool {
    is_dchar(c)
        || matches!(
            c,
            b' ' | b'!'
                | b'"'
                | b'%'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b'-'
                | b'.'
                | b'/'
                | b':'
                | b';'
                | b'<'
                | b'='
                | b'>'
                | b'?'
        )
}

/// True when every character of `s` is a d-character.
pub fn is_dstring(s: &str) -> bool {
    s.bytes().all(is_dchar)
}

/// True when every character of `s` is an a-character.
pub fn is_astring(s: &str) -> bool {
    s.bytes().all(is_achar)
}

/// True when `s` is a valid file identifier before the version suffix:
/// d-characters plus the `.` extension separator.
pub fn is_file_name(s: &str) -> bool {
    s.bytes().all(|c| is_dchar(c) || c == b'.')
}
