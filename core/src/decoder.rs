use once_cell::sync::Lazy;
use regex::Regex;

static NON_PRINTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\x20-\x7E\n\r]+").expect("valid non-printable pattern"));

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];

/// Turns a raw chunk of child output into clean printable-ASCII lines.
///
/// UTF-8 is tried first. Chunks that carry a UTF-16LE BOM or are dense
/// with NUL bytes (Windows tools such as `wsl.exe` write UTF-16LE even
/// into pipes) are decoded as UTF-16LE instead. Anything outside
/// `0x20..=0x7E` is dropped, trailing whitespace is trimmed and blank
/// lines are skipped. Never fails: undecodable input yields no lines.
pub fn decode(raw: &[u8]) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    let text = if looks_like_utf16le(raw) {
        decode_utf16le(raw)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    };

    clean_lines(&text)
}

fn looks_like_utf16le(raw: &[u8]) -> bool {
    if raw.starts_with(&UTF16LE_BOM) {
        return true;
    }

    if raw.len() < 2 || !raw.contains(&0) {
        return false;
    }

    let nuls = raw.iter().filter(|b| **b == 0).count();
    nuls * 4 >= raw.len()
}

fn decode_utf16le(raw: &[u8]) -> String {
    let mut bytes = raw;

    if bytes.starts_with(&UTF16LE_BOM) {
        bytes = &bytes[2..];
    } else if bytes.len() >= 2 && bytes[0] == 0 && bytes[1] != 0 {
        // High byte of the previous chunk's '\n' when the stream was split on 0x0A.
        bytes = &bytes[1..];
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16_lossy(&units)
}

fn clean_lines(text: &str) -> Vec<String> {
    let printable = NON_PRINTABLE.replace_all(text, "");

    printable
        .split(['\n', '\r'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_plain_ascii_is_untouched() {
        assert_eq!(decode(b"hello world\n"), vec!["hello world"]);
        assert_eq!(decode(b"  indented\n"), vec!["  indented"]);
    }

    #[test]
    fn test_splits_and_drops_blank_lines() {
        let lines = decode(b"one\r\n\r\ntwo   \n\n   \nthree");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_strips_control_and_non_ascii() {
        let lines = decode("\x1b[32mgreen\x1b[0m caf\u{e9} \t tab\n".as_bytes());
        assert_eq!(lines, vec!["[32mgreen[0m caf  tab"]);
    }

    #[test]
    fn test_invalid_utf8_does_not_fail() {
        let lines = decode(&[0x66, 0x6f, 0xff, 0xfe, 0x6f, b'\n']);
        assert_eq!(lines, vec!["foo"]);
    }

    #[test]
    fn test_utf16le_with_bom() {
        let mut raw = UTF16LE_BOM.to_vec();
        raw.extend(utf16le("WSL version: 2.3.26.0\r\n"));
        assert_eq!(decode(&raw), vec!["WSL version: 2.3.26.0"]);
    }

    #[test]
    fn test_utf16le_without_bom() {
        let raw = utf16le("Kernel version: 5.15\n");
        assert_eq!(decode(&raw), vec!["Kernel version: 5.15"]);
    }

    #[test]
    fn test_utf16le_split_on_newline_byte() {
        let raw = utf16le("first\nsecond\n");
        let split_at = raw.iter().position(|b| *b == b'\n').unwrap() + 1;
        let (head, tail) = raw.split_at(split_at);

        assert_eq!(decode(head), vec!["first"]);
        assert_eq!(decode(tail), vec!["second"]);
    }

    #[test]
    fn test_only_garbage_yields_nothing() {
        assert!(decode(b"").is_empty());
        assert!(decode(b"\x00").is_empty());
        assert!(decode(b"\x07\x08\x1b\n").is_empty());
    }

    proptest! {
        #[test]
        fn decoding_is_idempotent(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let once = decode(&raw);
            let twice = decode(once.join("\n").as_bytes());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn printable_ascii_lines_are_preserved(line in "[ -~]*[!-~]") {
            prop_assert_eq!(decode(line.as_bytes()), vec![line.clone()]);
        }
    }
}
